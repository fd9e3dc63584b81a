use clap::{ArgGroup, Parser as ClapParser};
use glob::glob;
use tracing::{debug, info};

use encore::analysis::{
    AnalysisSession, CancelToken, CapabilitySession, DocumentAnalysisResult, DocumentPair,
    EditCapabilities,
};
use encore::document::Document;
use encore::languages::RegisteredLanguage;
use encore::logging;
use encore::resource::Resource;

// --- CLI argument parsing --- //

#[derive(ClapParser, Debug)]
#[command(name = "encore")]
#[command(about = "Incremental edit analysis for edit-and-continue", long_about = None)]
#[command(group(ArgGroup::new("old_input").required(true).args(["old_files", "old_commit"])))]
pub struct Cli {
    /// Language of the source code
    #[arg(long)]
    pub lang: RegisteredLanguage,

    /// Runtime capabilities: a group name (baseline, net5, net6) or a
    /// comma-separated list of capability names
    #[arg(long, default_value = "net6", value_parser = parse_caps)]
    pub caps: EditCapabilities,

    /// New versions of files/globs to analyze
    #[arg(long, num_args = 1.., value_parser = parse_glob)]
    pub files: Vec<Vec<String>>,

    /// Old versions of files/globs to diff against, paired with --files by position
    #[arg(long, num_args = 1.., value_parser = parse_glob)]
    pub old_files: Option<Vec<Vec<String>>>,

    /// Git commit hash to extract old file versions from (new files must then be relative to the repo root)
    #[arg(long, value_parser = parse_commit)]
    pub old_commit: Option<String>,

    /// Emit the analysis result as JSON
    #[arg(long)]
    pub json: bool,
}

// --- Verification of user input --- //

fn parse_caps(input: &str) -> Result<EditCapabilities, String> {
    EditCapabilities::parse_list(input)
}

fn parse_glob(pattern: &str) -> Result<Vec<String>, String> {
    let matches: Vec<_> = glob(pattern)
        .map_err(|e| format!("Invalid glob '{}': {}", pattern, e))?
        .filter_map(Result::ok)
        .map(|p| p.display().to_string())
        .collect();

    if matches.is_empty() {
        return Err(format!("No files matched pattern '{}'", pattern));
    }

    Ok(matches)
}

fn parse_commit(commit: &str) -> Result<String, String> {
    if commit.len() < 4 || commit.len() > 40 {
        return Err(format!(
            "Invalid commit revision: {} expected length between 4 and 40",
            commit
        ));
    }
    if !commit
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '~' || c == '^' || c == '_')
    {
        return Err("Commit must be a revision like HEAD, HEAD~1 or a hex hash".to_string());
    }

    Ok(commit.to_string())
}

// --- Report rendering --- //

fn print_text_report(results: &[DocumentAnalysisResult]) {
    for result in results {
        if !result.has_changes {
            println!("{}: no changes", result.document);
            continue;
        }
        if !result.rude_edits.is_empty() {
            println!("{}: cannot hot-apply", result.document);
            for diag in &result.rude_edits {
                let line = diag.line_span.start.line + 1;
                match &diag.context {
                    Some(ctx) => println!("  line {line}: {} ({ctx})", diag.kind.message()),
                    None => println!("  line {line}: {}", diag.kind.message()),
                }
            }
            continue;
        }

        println!("{}: ok", result.document);
        if let Some(edits) = &result.semantic_edits {
            for edit in edits {
                println!("  {} {}", edit.kind, edit.symbol);
            }
        }
        if let Some(line_edits) = &result.line_edits {
            for update in line_edits {
                println!(
                    "  line mapping {} -> {}",
                    update.old_line + 1,
                    update.new_line + 1
                );
            }
        }
    }
}

// --- Main entry point --- //

fn run_application(args: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Only initialize logging if not already initialized (for tests)
    static LOGGING_INIT: std::sync::Once = std::sync::Once::new();
    LOGGING_INIT.call_once(|| {
        logging::init();
    });

    let new_paths: Vec<String> = args.files.into_iter().flatten().collect();

    let old_sources: Vec<String> = match (&args.old_commit, &args.old_files) {
        (Some(rev), _) => new_paths
            .iter()
            .map(|path| {
                let resource = Resource::new(path).with_git(rev.clone(), ".")?;
                if resource.exists().unwrap_or(false) {
                    resource.read_string()
                } else {
                    // File did not exist at the old revision; analyze it as
                    // entirely new.
                    Resource::empty().read_string()
                }
            })
            .collect::<Result<_, _>>()?,
        (None, Some(old_globs)) => {
            let old_paths: Vec<String> = old_globs.iter().flatten().cloned().collect();
            if old_paths.len() != new_paths.len() {
                return Err(format!(
                    "--old-files matched {} file(s) but --files matched {}",
                    old_paths.len(),
                    new_paths.len()
                )
                .into());
            }
            old_paths
                .iter()
                .map(|p| Resource::new(p).read_string())
                .collect::<Result<_, _>>()?
        }
        (None, None) => unreachable!("clap enforces the old_input group"),
    };

    debug!("Found {} file pair(s) to analyze", new_paths.len());

    let mut pairs = Vec::with_capacity(new_paths.len());
    for (path, old_source) in new_paths.iter().zip(old_sources) {
        let new_resource = Resource::new(path);
        let unchanged = new_resource.hash()? == blake3::hash(old_source.as_bytes());
        let old_doc = Document::parse(args.lang.clone(), path.clone(), old_source, 0)?;
        let new_doc = if unchanged {
            old_doc.clone()
        } else {
            old_doc.parse_successor(new_resource.read_string()?)?
        };
        pairs.push(DocumentPair {
            old: old_doc,
            new: new_doc,
            active_statements: Vec::new(),
        });
    }

    let session = AnalysisSession::new(CapabilitySession::fixed(args.caps));
    let results = session.analyze_all(pairs, &CancelToken::new())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_text_report(&results);
    }

    let merged = session.merged_semantic_edits(&results);
    if !merged.is_empty() {
        info!("{} symbol(s) require regeneration", merged.len());
    }

    let blocked = results.iter().filter(|r| !r.rude_edits.is_empty()).count();
    if blocked > 0 {
        info!("{blocked} document(s) cannot be hot-applied");
        std::process::exit(1);
    }

    info!("Successfully analyzed all documents");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Cli = Cli::parse();
    run_application(args)
}
