// Copyright 2026 Trace Contributors
// SPDX-License-Identifier: Apache-2.0

//! Trace runtime library. Renders a page in headless Chromium and captures
//! the first API response matching a signature.
//!
//! This library crate exposes the core modules for integration testing.

pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod renderer;
pub mod rest;
