//! sitecheck CLI
//!
//! Command-line front end: loads settings, URL lists, descriptors and
//! expectation catalogs, drives the engine and renders its results.

pub mod commands;
pub mod config;
pub mod input;
pub mod output;
