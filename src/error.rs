// src/error.rs
use libc::{
    EEXIST, EFBIG, EINVAL, EIO, EISDIR, ENAMETOOLONG, ENOENT, ENOSPC, ENOTDIR, ENOTEMPTY,
    EOPNOTSUPP,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("entrada no encontrada")]
    NotFound,
    #[error("la entrada ya existe")]
    AlreadyExists,
    #[error("no es un archivo regular")]
    NotAFile,
    #[error("es un directorio")]
    IsADirectory,
    #[error("no es un directorio")]
    NotADirectory,
    #[error("directorio no vacío")]
    NotEmpty,
    #[error("espacio insuficiente")]
    NoSpace,
    #[error("fuera de rango: {0}")]
    OutOfRange(String),
    #[error("no soportado: {0}")]
    Unsupported(&'static str),
    #[error("nombre demasiado largo ({0} bytes)")]
    NameTooLong(usize),
    #[error("nombre inválido: {0:?}")]
    InvalidName(String),
    /// Inconsistencia en la propia imagen; nunca se intenta reparar aquí.
    #[error("imagen corrupta: {detail}")]
    Corrupt { detail: String },
    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        FsError::Corrupt {
            detail: detail.into(),
        }
    }

    pub fn as_errno(&self) -> i32 {
        match self {
            FsError::NotFound => ENOENT,
            FsError::AlreadyExists => EEXIST,
            FsError::NotAFile => EISDIR,
            FsError::IsADirectory => EISDIR,
            FsError::NotADirectory => ENOTDIR,
            FsError::NotEmpty => ENOTEMPTY,
            FsError::NoSpace => ENOSPC,
            FsError::OutOfRange(_) => EFBIG,
            FsError::Unsupported(_) => EOPNOTSUPP,
            FsError::NameTooLong(_) => ENAMETOOLONG,
            FsError::InvalidName(_) => EINVAL,
            FsError::Corrupt { .. } => EIO,
            FsError::Io(_) => EIO,
        }
    }
}
