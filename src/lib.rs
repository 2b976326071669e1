//! citator: a citation and auto-numbering engine for math-heavy Markdown vaults
//!
//! This crate keeps equation/figure/callout citations synchronized with
//! auto-generated, heading-hierarchical tags across a vault of interlinked
//! Markdown documents.
//!
//! # Overview
//!
//! citator is built for long technical documents that cite equations with
//! `\ref{...}` inside inline math, where tags like `2.3.1` derive from the
//! heading hierarchy and must survive edits, heading moves, and renames:
//!
//! - **Structural Parsing**: line-context scanning plus per-entity parsers
//!   for equations, figures, callouts, footnotes, and citations
//! - **Incremental Caching**: per-file, time-boxed caches with deduplicated
//!   refreshes and bounded memory
//! - **Auto-Numbering**: heading-hierarchical counters that rewrite
//!   `\tag{}` / `#label("")` syntax and report every tag change
//! - **Rename Propagation**: vault-wide citation rewrites driven by the
//!   cached citation lists
//! - **Cross-File Citations**: footnote-indirected tags that resolve into
//!   other documents' caches
//!
//! # Architecture
//!
//! The crate is organized around several key modules:
//!
//! - [`scanner`]: per-line document context (code fences, quote depth,
//!   equation delimiters)
//! - [`parse`]: entity parsers built on the scanner
//! - [`cache`]: the generic time-boxed document cache
//! - [`numbering`]: the heading-hierarchical auto-number engine
//! - [`citation`]: continuous-range notation and cross-file resolution
//! - [`rename`]: the vault-wide tag rename service
//!
//! # Usage
//!
//! ```ignore
//! use citator::config::Settings;
//! use citator::engine::Engine;
//! use citator::store::FsStore;
//!
//! let settings = Settings::default();
//! let engine = Engine::new(settings, FsStore::new(vault_root));
//! let equations = engine.equations(&path).await;
//! ```

// Core parsing modules
pub mod parse;
pub mod scanner;

// Derived-state modules
pub mod cache;
pub mod citation;
pub mod hash;
pub mod numbering;
pub mod rename;

// Orchestration and collaborators
pub mod engine;
pub mod store;

// Configuration and errors
pub mod config;
pub mod error;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
