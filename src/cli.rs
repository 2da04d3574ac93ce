// mm2batch: Batch alignment boundary codec and buffer ownership.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // Build an index from a fasta or fastq file
    Index {
        // Reference sequences
        #[arg(group = "input", required = true, help = "Input fastX file")]
        input_file: PathBuf,

        // Output file path
        #[arg(short = 'o', long = "output", required = true)]
        out_file: PathBuf,

        // k-mer length, overrides the preset
        #[arg(short = 'k', long = "kmer-len", required = false)]
        kmer_len: Option<usize>,

        // Preset the index is built for
        #[arg(short = 'x', long = "preset", required = false)]
        preset: Option<String>,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Align sequences in batches
    Align {
        // Index or reference fastX file
        #[arg(required = true, help = "Index file")]
        index_file: PathBuf,

        // Query sequences
        #[arg(required = true, help = "Query fastX file")]
        query_file: PathBuf,

        // Output file path, defaults to stdout
        #[arg(short = 'o', long = "output", required = false)]
        out_file: Option<PathBuf>,

        // Options preset
        #[arg(short = 'x', long = "preset", required = false)]
        preset: Option<String>,

        // Sequences per batch
        #[arg(long = "batch-size", default_value_t = 1000)]
        batch_size: usize,

        // Cap on bytes held by live buffers
        #[arg(long = "memory-limit", required = false)]
        memory_limit: Option<usize>,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Print contig names of an index
    Names {
        // Index or reference fastX file
        #[arg(required = true, help = "Index file")]
        index_file: PathBuf,

        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },

    // Print library version
    Version {
        // Verbosity
        #[arg(long = "verbose", default_value_t = false)]
        verbose: bool,
    },
}
