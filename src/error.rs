use failure::Fail;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "Invalid plate number {:?}: {}", plate, reason)]
    InvalidPlate { plate: String, reason: &'static str },

    #[fail(display = "Not logged in")]
    NotAuthenticated,

    #[fail(display = "Invalid value {:?} for {}", value, key)]
    Config { key: &'static str, value: String },

    #[fail(display = "HTTP request failed: {}", _0)]
    Http(#[cause] reqwest::Error),

    #[fail(display = "Invalid URL: {}", _0)]
    Url(#[cause] url::ParseError),

    #[fail(display = "Unexpected response payload: {}", _0)]
    Json(#[cause] serde_json::Error),

    #[fail(display = "Image error: {}", _0)]
    Image(#[cause] image::ImageError),

    #[fail(display = "I/O error: {}", _0)]
    Io(#[cause] io::Error),

    #[fail(display = "Camera stream ended before a complete frame arrived")]
    StreamEnded,
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Url(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
