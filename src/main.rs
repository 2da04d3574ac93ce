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
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use clap::Parser;

use mm2batch::{Aligner, Alignment, Bridge, BridgeError, EngineConfig, Index, Preset};
use mm2batch::index::DEFAULT_KMER_LEN;

mod cli;

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
    stderrlog::new()
    .module(module_path!())
    .quiet(false)
    .verbosity(log_max_level)
    .timestamp(stderrlog::Timestamp::Off)
    .init()
    .unwrap();
}

/// Logger verbosity for the `--verbose` flag; 3 shows debug messages.
fn log_level(
    verbose: bool,
) -> usize {
    if verbose { 3 } else { 1 }
}

/// Engine verbosity for the `--verbose` flag; above 1 the engine logs per query.
fn engine_verbosity(
    verbose: bool,
) -> usize {
    if verbose { 2 } else { 0 }
}

fn parse_preset(
    preset: &Option<String>,
) -> Result<Option<Preset>, BridgeError> {
    preset.as_deref().map(Preset::from_str).transpose()
}

fn write_alignments<W: Write>(
    query_name: &str,
    alignments: &[Alignment],
    ref_names: &[String],
    conn_out: &mut W,
) -> Result<(), BridgeError> {
    for aln in alignments {
        let ref_name = usize::try_from(aln.ref_id).ok().and_then(|id| ref_names.get(id)).map_or("*", |name| name.as_str());
        let strand = if aln.reverse { '-' } else { '+' };
        writeln!(conn_out, "{}\t{}\t{}\t{}\t{}\t{}", query_name, ref_name, aln.ref_start, strand, aln.mapq, aln.cigar_string())?;
    }
    Ok(())
}

fn align_batch<W: Write>(
    aligner: &mut Aligner<'_, mm2batch::ExactMatchEngine>,
    names: &[String],
    seqs: &[Vec<u8>],
    ref_names: &[String],
    conn_out: &mut W,
) -> Result<(), BridgeError> {
    let alignments = aligner.align_seqs(seqs)?;
    for (name, alns) in names.iter().zip(alignments.iter()) {
        write_alignments(name, alns, ref_names, conn_out)?;
    }
    Ok(())
}

fn align(
    index_file: &Path,
    query_file: &Path,
    out_file: &Option<std::path::PathBuf>,
    preset: Option<Preset>,
    batch_size: usize,
    memory_limit: Option<usize>,
    verbosity: usize,
) -> Result<(), BridgeError> {
    let mut bridge = Bridge::new().with_config(EngineConfig { verbosity });
    if let Some(limit) = memory_limit {
        bridge = bridge.with_memory_limit(limit);
    }
    let index = bridge.open_index(index_file)?;
    let mut aligner = Aligner::new(&mut bridge, index, preset)?;
    let ref_names = aligner.reference_names()?;

    let mut conn_out: Box<dyn Write> = match out_file {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    let mut reader = needletail::parse_fastx_file(query_file).map_err(|err| {
        BridgeError::Io(format!("can't read query file {}: {}", query_file.display(), err))
    })?;

    let batch_size = batch_size.max(1);
    let mut names: Vec<String> = Vec::with_capacity(batch_size);
    let mut seqs: Vec<Vec<u8>> = Vec::with_capacity(batch_size);
    let mut n_queries = 0;
    while let Some(record) = reader.next() {
        let record = record.map_err(|err| {
            BridgeError::Io(format!("can't read query file {}: {}", query_file.display(), err))
        })?;
        let id = String::from_utf8_lossy(record.id()).to_string();
        names.push(id.split_whitespace().next().unwrap_or_default().to_string());
        seqs.push(record.seq().to_vec());

        if seqs.len() == batch_size {
            align_batch(&mut aligner, &names, &seqs, &ref_names, &mut conn_out)?;
            n_queries += seqs.len();
            names.clear();
            seqs.clear();
        }
    }
    if !seqs.is_empty() {
        align_batch(&mut aligner, &names, &seqs, &ref_names, &mut conn_out)?;
        n_queries += seqs.len();
    }
    conn_out.flush()?;

    log::info!("Aligned {} queries against {} contigs", n_queries, ref_names.len());
    Ok(())
}

fn run(
    command: &cli::Commands,
) -> Result<(), BridgeError> {
    match command {
        // Index
        cli::Commands::Index {
            input_file,
            out_file,
            kmer_len,
            preset,
            verbose: _,
        } => {
            let preset = parse_preset(preset)?;
            let kmer_len = kmer_len.or(preset.map(|p| p.kmer_len())).unwrap_or(DEFAULT_KMER_LEN);
            let index = Index::from_fastx(input_file, kmer_len)?;
            index.save(out_file)?;
            log::info!("Wrote index of {} contigs to {}", index.len(), out_file.display());
        },

        // Align
        cli::Commands::Align {
            index_file,
            query_file,
            out_file,
            preset,
            batch_size,
            memory_limit,
            verbose,
        } => {
            let preset = parse_preset(preset)?;
            align(index_file, query_file, out_file, preset, *batch_size, *memory_limit, engine_verbosity(*verbose))?;
        },

        // Names
        cli::Commands::Names {
            index_file,
            verbose: _,
        } => {
            let mut bridge = Bridge::new();
            let index = bridge.open_index(index_file)?;
            let mut aligner = Aligner::new(&mut bridge, index, None)?;
            let mut conn_out = BufWriter::new(std::io::stdout());
            for name in aligner.reference_names()? {
                writeln!(conn_out, "{}", name)?;
            }
            conn_out.flush()?;
        },

        // Version
        cli::Commands::Version {
            verbose: _,
        } => {
            println!("{}", mm2batch::version());
        },
    }
    Ok(())
}

fn main() {
    let cli = cli::Cli::parse();

    let verbose = match &cli.command {
        Some(cli::Commands::Index { verbose, .. }) => *verbose,
        Some(cli::Commands::Align { verbose, .. }) => *verbose,
        Some(cli::Commands::Names { verbose, .. }) => *verbose,
        Some(cli::Commands::Version { verbose }) => *verbose,
        None => false,
    };
    init_log(log_level(verbose));

    let Some(command) = &cli.command else {
        println!("mm2batch {}: see `mm2batch --help` for usage", mm2batch::version());
        return;
    };

    if let Err(e) = run(command) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn verbose_flag_enables_debug_logging() {
        use super::{engine_verbosity, log_level};

        // stderrlog: 1 is warn, 3 is debug
        assert_eq!(log_level(false), 1);
        assert_eq!(log_level(true), 3);
        assert_eq!(engine_verbosity(false), 0);
        assert!(engine_verbosity(true) > 1);
    }
}
