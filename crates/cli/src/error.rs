use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("unable to build area {_0}")]
    Setup(#[error(not(source))] String),
    #[display("{_0}")]
    Unsupported(#[error(not(source))] String),
    #[display("source error")]
    Source,
    #[display("cache area operation failed")]
    Area,
}
