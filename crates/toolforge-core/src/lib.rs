// ABOUTME: Core data model and argument-merge algorithm for the Toolforge tool-server toolkit
// ABOUTME: Shared by the scanner, the stores, the generator, and the dispatcher runtime
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Toolforge Contributors

#![deny(unsafe_code)]

//! # Toolforge Core
//!
//! Foundation crate for [Toolforge](https://github.com/toolforge-dev/toolforge), a
//! tool-server toolkit that turns a handler source tree into runnable MCP tool
//! servers. This crate holds the data model every other component agrees on:
//!
//! - **handler**: [`HandlerRecord`] and [`TypeRecord`], produced by the source
//!   scanner and read by the registry store and the generator.
//! - **tool**: [`ToolDefinition`], [`FactorSpec`] and the JSON-Schema-like
//!   [`JsonSchema`]/[`PropertySchema`] pair — the externally visible tool
//!   surface owned by the tool definition store.
//! - **overlay**: [`InternalArgsOverlay`], the sibling document that holds
//!   properties that have been moved off a tool's visible schema.
//! - **profile**: [`Profile`] and [`ProfileIndex`] metadata.
//! - **argument_model**: the tri-layer merge algorithm (internal →
//!   signature-defaults → signature) shared by the generator (which emits it
//!   as rendered code) and the dispatcher runtime library (which executes it
//!   directly).
//! - **error**: [`ToolforgeError`] and [`ErrorKind`], the error taxonomy every
//!   component surfaces through.
//!
//! This crate does no file I/O and no process management — it is the part of
//! the workspace that changes least often, mirroring the role the teacher
//! codebase gives its own foundation crate.

/// Handler and type records produced by the source scanner (C1) and stored
/// by the registry store (C2).
pub mod handler;

/// The tool definition model owned by the tool definition store (C3):
/// [`tool::ToolDefinition`], [`tool::FactorSpec`], and the schema types.
pub mod tool;

/// The internal-args overlay, the sibling document to the tool catalog.
pub mod overlay;

/// Profile metadata owned by the profile registry (C4).
pub mod profile;

/// The tri-layer argument merge algorithm (C5).
pub mod argument_model;

/// Shared error taxonomy (spec §7) used by every component.
pub mod error;

pub use error::{ErrorKind, ToolforgeError, ToolforgeResult};
pub use handler::{HandlerRecord, Parameter, TypeExpression, TypeRecord};
pub use overlay::{InternalArgsOverlay, OverlayEntry};
pub use profile::{Profile, ProfileIndex};
pub use tool::{FactorSource, FactorSpec, JsonSchema, PropertySchema, ToolDefinition};
