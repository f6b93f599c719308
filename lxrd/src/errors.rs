// Copyright (c) 2023 Yan Ka, Chiu.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions
// are met:
// 1. Redistributions of source code must retain the above copyright
//    notice, this list of conditions, and the following disclaimer,
//    without modification, immediately at the beginning of the file.
// 2. The name of the author may not be used to endorse or promote products
//    derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE AUTHOR AND CONTRIBUTORS ``AS IS'' AND
// ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
// ARE DISCLAIMED. IN NO EVENT SHALL THE AUTHOR OR CONTRIBUTORS BE LIABLE FOR
// ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS
// OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION)
// HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT
// LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY
// OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF
// SUCH DAMAGE.
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lxr::models::config::ConfigError;
use lxr::models::device::DeviceError;
use lxr::runtime::RuntimeError;
use thiserror::Error;

/// Everything a handler can fail with, classified the way it is rendered
/// to the client.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),
    /// Only issued for a wrong exec/migration channel secret
    #[error("wrong secret")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl std::fmt::Display) -> Error {
        Error::BadRequest(message.to_string())
    }

    pub fn not_found(message: impl std::fmt::Display) -> Error {
        Error::NotFound(message.to_string())
    }

    pub fn conflict(message: impl std::fmt::Display) -> Error {
        Error::Conflict(message.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(value: StoreError) -> Error {
        match value {
            StoreError::NotFound => Error::NotFound("no such record".to_string()),
            StoreError::AlreadyDefined => {
                Error::Conflict("container is already defined".to_string())
            }
            StoreError::NoSuchProfile(name) => Error::bad_request(format!("no such profile {name}")),
            StoreError::Config(error) => Error::bad_request(error),
            StoreError::Device(error) => Error::bad_request(error),
            StoreError::Sqlite(error) => Error::Internal(anyhow::Error::new(error)),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Error {
        Error::bad_request(value)
    }
}

impl From<DeviceError> for Error {
    fn from(value: DeviceError) -> Error {
        Error::bad_request(value)
    }
}

impl From<RuntimeError> for Error {
    fn from(value: RuntimeError) -> Error {
        match value {
            RuntimeError::NotRunning => Error::bad_request("container is not running"),
            other => Error::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Error {
        Error::Internal(anyhow::Error::new(value))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Error {
        Error::Internal(anyhow::Error::new(value))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "type": "error",
            "error": self.to_string(),
            "error_code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::store::StoreError;
    use axum::http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::from(StoreError::AlreadyDefined).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::from(StoreError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Error::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::NotImplemented("push".to_string()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
    }
}
