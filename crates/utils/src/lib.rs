// Copyright 2024-2025 Irreducible Inc.

//! Small shared helpers used across the tilecheck workspace.

pub mod checked_arithmetics;
pub mod env;
pub mod error_utils;
pub mod rayon;
pub mod tracing;
