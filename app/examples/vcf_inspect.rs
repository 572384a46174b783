// ==============================================================================
// examples/vcf_inspect.rs - Dry-run VCF normalization
// ==============================================================================
// Description: Shows the variants, genotypes and coercion warnings a file
//              would produce, without touching a store
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-19
// ==============================================================================

use std::env;

use variant_ingest::genotype::render_genotype;
use variant_ingest::parsers::VCFReader;
use variant_ingest::upsert::build_variants;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Get file path from command line
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <vcf_file> [max_records]", args[0]);
        eprintln!("\nExample:");
        eprintln!("  cargo run --example vcf_inspect -- /path/to/sample.vcf.gz 20");
        std::process::exit(1);
    }

    let vcf_path = &args[1];
    let max_records: usize = args.get(2).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(10);

    println!("Opening file: {}", vcf_path);
    let mut reader = VCFReader::open(vcf_path)?;
    let samples = reader.sample_names().to_vec();
    println!(
        "Header: {} INFO definitions, {} samples\n",
        reader.header().infos().len(),
        samples.len()
    );

    let mut warnings = Vec::new();
    let mut records = 0;
    let mut variants = 0;

    while let Some(record) = reader.read_record()? {
        records += 1;

        for variant in build_variants(&record, &mut warnings) {
            variants += 1;
            if records <= max_records {
                println!(
                    "{}  qual={:?} filter={} dp={:?} af={:?} ann={}",
                    variant.key,
                    variant.qual,
                    variant.filter,
                    variant.fields.dp,
                    variant.fields.af,
                    variant.ann.is_some()
                );
                for (name, pair) in samples.iter().zip(&record.genotypes) {
                    println!("    {} {}", name, render_genotype(*pair));
                }
            }
        }
    }

    println!("\n=== Results ===");
    println!("Records: {}", records);
    println!("Variants (one per alt): {}", variants);
    println!("Coercion warnings: {}", warnings.len());
    for warning in warnings.iter().take(10) {
        println!("  {}", warning);
    }

    Ok(())
}
