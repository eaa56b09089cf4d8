// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors
//
// This file is part of Corvid.
//
// Corvid is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Corvid is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Corvid. If not, see <https://www.gnu.org/licenses/>.

//! Configuration store
//!
//! A JSON tree with typed path access and change notification. The remote
//! configuration service that feeds it is out of scope; anything that can
//! produce a JSON document (file watcher, config service subscriber, test)
//! calls [`ConfigStore::load_from_reader`] and every subscriber re-reads the
//! paths it cares about.

mod store;
mod value;

pub use store::ConfigStore;
pub use value::{parse_duration, ConfigValue};

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
