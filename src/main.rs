//! evorepair CLI - Run a repair from a JSON run manifest.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use evorepair::{
    compute::{
        CatalogModelBuilder, LinePatcher, RepairSession, Sources, Toolchain,
        harness::{CommandCompiler, CommandTestHarness},
    },
    schema::{RunManifest, SearchResult},
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <manifest.json>", args[0]);
        eprintln!();
        eprintln!("Search for patches that make the failing tests pass.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  manifest.json  Run manifest (configuration, inputs and commands)");
        eprintln!();
        eprintln!("An example manifest is printed with the --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_manifest();
        return;
    }

    let manifest_path = PathBuf::from(&args[1]);
    let mut manifest = RunManifest::load(&manifest_path).unwrap_or_else(|e| {
        eprintln!("Error reading manifest: {}", e);
        std::process::exit(1);
    });
    if let Some(ms) = manifest.compile.timeout_ms {
        manifest.config.evaluation.compile_timeout_ms = ms;
    }

    let builder = CatalogModelBuilder::from_file(&manifest.catalog).unwrap_or_else(|e| {
        eprintln!("Error loading catalog: {}", e);
        std::process::exit(1);
    });

    let session = RepairSession::from_coverage(
        manifest.config.clone(),
        &manifest.coverage,
        Box::new(builder),
    )
    .unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let compiler = CommandCompiler::new(
        manifest.compile.program.clone(),
        manifest.compile.args.clone(),
        manifest.work_dir.clone(),
    )
    .with_timeout(manifest.config.evaluation.compile_timeout());
    let toolchain = Toolchain {
        patcher: Box::new(LinePatcher),
        compiler: Arc::new(compiler),
        harness: Arc::new(CommandTestHarness::new(
            manifest.test.program.clone(),
            manifest.test.args.clone(),
        )),
    };

    let search = &manifest.config.search;
    println!("evorepair");
    println!("=========");
    println!("Source root: {}", manifest.source_root.display());
    println!(
        "Population: {}, generations: {}, objectives: {}",
        search.population_size, search.max_generations, search.number_of_objectives
    );
    println!("Novelty: {:?}", manifest.config.novelty.mode);
    println!();

    let mut engine = session
        .prepare(toolchain, Sources::Root(manifest.source_root.clone()))
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    println!("Searching...");
    let result = engine.run_with_callback(|progress| {
        println!(
            "  Generation {}/{}: {} evaluations, front={}, best={:.4}, patches={}",
            progress.generation,
            progress.total_generations,
            progress.evaluations,
            progress.front_size,
            progress.best_fitness,
            progress.patches_found
        );
    });

    print_summary(&result);

    if let Some(path) = &manifest.result {
        let json = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
            eprintln!("Error serializing result: {}", e);
            std::process::exit(1);
        });
        if let Err(e) = fs::write(path, json) {
            eprintln!("Error writing {}: {}", path.display(), e);
            std::process::exit(1);
        }
        println!("Result written to {}", path.display());
    }
}

fn print_summary(result: &SearchResult) {
    let stats = &result.stats;
    println!();
    println!("Search finished ({:?})", stats.stop_reason);
    println!(
        "  {} evaluations in {:.1}s ({:.2}/s)",
        stats.total_evaluations, stats.elapsed_seconds, stats.evaluations_per_second
    );
    println!("  Pareto front: {} candidates", result.front.len());
    println!("  Test-adequate patches: {}", result.patches.len());
    for patch in &result.patches {
        println!(
            "  Patch {} (evaluation {}, {} ms):",
            patch.id, patch.evaluations, patch.elapsed_ms
        );
        for edit in &patch.edits {
            match &edit.ingredient {
                Some(ingredient) => println!(
                    "    {} {}: {} -> {}",
                    edit.operator, edit.location, edit.statement, ingredient
                ),
                None => println!("    {} {}: {}", edit.operator, edit.location, edit.statement),
            }
        }
    }
}

fn print_example_manifest() {
    match serde_json::to_string_pretty(&RunManifest::example()) {
        Ok(json) => {
            println!("Example manifest (manifest.json):");
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("Error serializing example: {}", e);
            std::process::exit(1);
        }
    }
}
