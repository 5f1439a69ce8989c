// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete generation and embedding capabilities.

pub mod command;
pub mod http;

pub use command::CommandGenerator;
pub use http::HttpEmbedder;
