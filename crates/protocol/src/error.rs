use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProtocolError {
    #[snafu(display("protocol id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("{entity} payload is missing required field '{field}'"))]
    MissingField {
        stage: &'static str,
        entity: &'static str,
        field: &'static str,
    },
    #[snafu(display("{entity} payload is invalid: {details}"))]
    InvalidPayload {
        stage: &'static str,
        entity: &'static str,
        details: String,
    },
    #[snafu(display("failed to decode realtime frame on `{stage}`: {source}"))]
    DecodeFrame {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode realtime frame on `{stage}`: {source}"))]
    EncodeFrame {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
