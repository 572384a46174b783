// ==============================================================================
// lib.rs - Variant Ingest Library
// ==============================================================================
// Description: Library interface for VCF ingestion and ClinVar matching modules
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================

pub mod parsers;
pub mod audit;
pub mod validator;
pub mod normalize;
pub mod coerce;
pub mod annotation;
pub mod genotype;
pub mod models;
pub mod store;
pub mod registry;
pub mod upsert;
pub mod clinvar;
pub mod config;
pub mod processor;
pub mod query;
