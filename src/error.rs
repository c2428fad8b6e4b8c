/**
 * BlendReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::io;

use thiserror::Error;

/// Everything that can go wrong while ingesting data, training or serving models.
#[derive(Debug, Error)]
pub enum RecoError {
    /// Malformed or missing interaction or property records. `line` is the 1-based record
    /// number in the input, if known.
    #[error("data error (record {line:?}): {message}")]
    Data { line: Option<u64>, message: String },

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// Invalid parameter, raised when a configuration or model is constructed.
    #[error("invalid configuration for '{option}': {message}")]
    Config { option: &'static str, message: String },

    #[error("unknown model name: {0}")]
    UnknownModel(String),

    #[error("no trained model available under key '{0}'")]
    ModelNotTrained(String),

    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecoError>;

impl RecoError {

    pub fn data(line: Option<u64>, message: impl Into<String>) -> Self {
        RecoError::Data { line, message: message.into() }
    }

    pub fn config(option: &'static str, message: impl Into<String>) -> Self {
        RecoError::Config { option, message: message.into() }
    }

    /// Unknown users and items are recoverable through the fallback chain, everything else is not.
    pub fn is_unknown_identifier(&self) -> bool {
        match self {
            RecoError::UnknownUser(_) | RecoError::UnknownItem(_) => true,
            _ => false,
        }
    }
}
