// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io;

use crate::network::Destination;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    /// transport errors always carry the destination identity so the caller
    /// can decide whether to retry against the same or a different broker
    #[error("connection error: {destination}: {message}")]
    Connection {
        destination: Destination,
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("connection pool exhausted for {destination}: {in_use} in use, limit {limit}")]
    PoolExhausted {
        destination: Destination,
        in_use: usize,
        limit: usize,
    },

    /// broker protocol errors, raised by the dao layer only
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AppError {
    pub(crate) fn connection(
        destination: &Destination,
        message: impl Into<String>,
        source: Option<io::Error>,
    ) -> AppError {
        AppError::Connection {
            destination: destination.clone(),
            message: message.into(),
            source,
        }
    }
}
