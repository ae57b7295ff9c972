use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Input file {0:?} does not exist.")]
    InputNotFound(PathBuf),

    #[error("Geometry type {0} is unsupported.")]
    UnsupportedGeometry(String),

    #[error("Given color {0} is invalid.")]
    InvalidColor(String),

    #[error("Property {0:?} is reserved for style linkage.")]
    ReservedKey(String),

    #[error("Unknown text encoding {0:?}.")]
    UnknownEncoding(String),

    #[error("Missing required element <{0}>.")]
    MissingElement(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Error while processing the geozero source.")]
    GeozeroError(#[from] geozero::error::GeozeroError),

    #[error("Serde error.")]
    SerdeError(#[from] serde_json::error::Error),

    #[error("An error happend: {0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(quick_xml::Error::from(err))
    }
}
