// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors

//! Runtime environment lookups shared by client and server.

/// Hostname of this machine, best effort.
pub fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Availability zone this process runs in, empty when unknown.
pub fn az_name() -> String {
    std::env::var("CORVID_AZ").unwrap_or_default()
}

/// Machine class label, empty when unset.
pub fn machine_class() -> String {
    std::env::var("CORVID_MACHINE_CLASS").unwrap_or_default()
}
