// ABOUTME: Main library entry point for the Toolforge tool-server toolkit
// ABOUTME: Curates tool catalogs, generates transport-flavored MCP servers, and supervises their processes

#![deny(unsafe_code)]

//! # Toolforge
//!
//! A toolkit for curating, generating, and supervising Model Context
//! Protocol tool servers.
//!
//! ## Architecture
//!
//! Toolforge is organized around nine cooperating components:
//! - **Scanner**: discovers handler registration markers in source trees
//! - **Registry store**: persists the per-server handler manifests the
//!   scanner produces
//! - **Tool store**: the curated tool catalog an editor UI edits, with
//!   atomic saves and optimistic concurrency
//! - **Profile registry**: named profiles, their derivation, and
//!   protected-profile deletion
//! - **Dispatcher**: the runtime argument-merge-and-invoke logic embedded
//!   in every generated server
//! - **Generator**: renders REST, stream, and stdio transport-flavored
//!   server artifacts from a tool catalog
//! - **Supervisor**: starts, stops, restarts, and reports on generated
//!   server processes
//! - **Editor control plane**: the `HTTP` API an external editor UI drives
//!
//! ## Quick Start
//!
//! 1. Run `toolforge-cli scan` over a handler source tree to populate a
//!    server's registry.
//! 2. Curate a tool catalog for a profile, either by hand or through an
//!    editor UI talking to `toolforge-editor`.
//! 3. Run `toolforge-cli generate` (or `POST /api/server-generator`) to
//!    render that profile's REST/stream/stdio servers.
//! 4. Start a generated server with `toolforge-cli server start` (or the
//!    equivalent editor API call).

/// Atomic, backup-preserving file writes shared by the tool store, profile
/// registry, and registry store.
pub mod atomic_file;

/// Environment-derived configuration for the editor control plane and
/// generated servers.
pub mod config;

/// Runtime argument-merge-and-invoke logic embedded in every generated
/// server (C7).
pub mod dispatcher;

/// The Editor Control Plane (C9): the `HTTP` API an external editor UI
/// drives.
pub mod editor;

/// `HTTP` boundary error mapping shared by the editor control plane and
/// generated-server dispatch routes.
pub mod error;

/// Server Generator (C6): renders per-protocol server artifacts from a
/// tool catalog.
pub mod generator;

/// Structured logging initialization shared by every binary.
pub mod logging;

/// Profile Registry (C4): named profiles, derivation, and protected
/// deletion.
pub mod profile_registry;

/// Registry Store (C2): persists per-server handler manifests.
pub mod registry_store;

/// Source Scanner (C1): discovers handler registration markers in source
/// trees.
pub mod scanner;

/// Process Supervisor (C8): lifecycle of generated server processes.
pub mod supervisor;

/// Tool Definition Store (C3): the curated tool catalog an editor UI
/// edits.
pub mod tool_store;

/// Type Record to JSON Schema lowering (SPEC_FULL §3): turns a scanned
/// named record type into the shape a tool property's `base_model`
/// extension refers to.
pub mod type_registry;
