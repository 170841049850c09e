use thiserror::Error;

/// Why a container could not be decoded. Decoding never yields a partial
/// project.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed tag at byte {position}: {detail}")]
    MalformedTag { position: usize, detail: String },

    #[error("<{element}> is missing required field `{field}`")]
    MissingRequiredField { element: String, field: String },

    #[error("duplicate {kind} identifier `{id}`")]
    DuplicateIdentifier { kind: &'static str, id: String },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("XML write error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{context} is not a finite number")]
    NonFiniteValue { context: String },

    #[error("preserved extension is not a single well-formed element: {raw}")]
    InvalidExtension { raw: String },
}
