use std::io;

use thiserror::Error;

use crate::probe::ProbeError;

#[derive(Error, Debug)]
pub enum NetprobeError {
    #[error("{0}: Hostname not resolvable.")]
    HostnameNotResolved(String),

    #[error("Target ip address required!")]
    MissingDestination,

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
