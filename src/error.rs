use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    /// Building a backend or client from the configuration failed.
    #[display("could not initialise {_0}")]
    Setup(#[error(not(source))] &'static str),
    #[display("command failed")]
    Command,
    #[display("could not write output")]
    Output,
}
