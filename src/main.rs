//! patchsmith: interactive LLM code-edit pipeline.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use patchsmith::config;
use patchsmith::constants;
use patchsmith::context;
use patchsmith::declarations;
use patchsmith::env;
use patchsmith::files;
use patchsmith::instructions;
use patchsmith::interact;
use patchsmith::pipeline;
use patchsmith::providers;
use patchsmith::run;
use patchsmith::selection;
use patchsmith::test_runner;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;

use cli::args::{Cli, Command, ContextArgs, ParseArgs, PathArgs, RunArgs};
use config::Config;
use env::Env;
use files::git;
use interact::{AutoConfirm, CommandEditor, Confirm, TerminalConfirm};
use pipeline::{Collaborators, Pipeline, PipelineOptions};
use providers::rig::{DEFAULT_MAX_TOKENS, FAST_MAX_TOKENS, RigProvider};
use providers::tokens::AnthropicTokenCounter;
use providers::{LanguageModel, TokenCounter};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let env = Env::real();
    cli::init_logging(cli.log_level.as_deref(), cli.log_file.as_deref(), &env)?;

    match cli.command {
        Command::Run(args) => run_pipeline(args, &env).await,
        Command::Context(args) => run_context(args, &env).await,
        Command::Parse(args) => run_parse(args).await,
        Command::Files(args) => run_files(args, &env).await,
        Command::Declarations(args) => run_declarations(args, &env).await,
        Command::Version => {
            println!("{} {} ({})", constants::APP_NAME, constants::VERSION, constants::TARGET);
            Ok(())
        }
    }
}

/// Canonical project root: the enclosing repository when there is one.
async fn resolve_root(path: &Path) -> Result<PathBuf> {
    let path = std::fs::canonicalize(path)
        .with_context(|| format!("path does not exist: {}", path.display()))?;
    if git::is_git_repo(&path).await {
        if let Ok(root) = git::find_repo_root(&path).await {
            return Ok(root);
        }
    }
    Ok(path)
}

fn load_config(root: &Path, env: &Env, include_tests: bool) -> Result<Config> {
    let mut config = Config::load(Some(root), env).context("failed to load configuration")?;
    if include_tests {
        config.context.include_tests = true;
    }
    Ok(config)
}

fn fast_model(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let provider = RigProvider::new(config.provider.with_model(&config.tiers.fast_model), FAST_MAX_TOKENS)
        .context("failed to configure the fast model")?;
    Ok(Arc::new(provider))
}

fn token_counter(config: &Config, env: &Env) -> Result<Arc<dyn TokenCounter>> {
    let counter = AnthropicTokenCounter::new(&config.tokens, config.token_counter_key(env))
        .context("failed to configure token counting")?;
    Ok(Arc::new(counter))
}

fn confirm_for(yes: bool) -> Arc<dyn Confirm> {
    if yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(TerminalConfirm::new())
    }
}

/// Run the interactive pipeline.
async fn run_pipeline(args: RunArgs, env: &Env) -> Result<()> {
    let root = resolve_root(&args.path).await?;
    if !git::is_git_repo(&root).await {
        bail!(
            "not a git repository: {}. Run 'git init' before using {}.",
            root.display(),
            constants::APP_NAME
        );
    }

    let mut config = load_config(&root, env, args.include_tests)?;
    if let Some(editor) = args.editor {
        config.pipeline.editor = editor;
    }
    if args.no_tests {
        config.pipeline.run_tests = false;
    }
    if args.no_branch {
        config.pipeline.create_branches = false;
    }

    let main_model = RigProvider::new(config.provider.clone(), DEFAULT_MAX_TOKENS)
        .context("failed to configure the instruction model")?;
    let large_model = RigProvider::new(
        config.provider.with_model(&config.tiers.large_model),
        DEFAULT_MAX_TOKENS,
    )
    .context("failed to configure the large model")?;

    let collab = Collaborators {
        main: Arc::new(main_model),
        fast: fast_model(&config)?,
        large: Arc::new(large_model),
        counter: token_counter(&config, env)?,
        confirm: confirm_for(args.yes),
        editor: Arc::new(CommandEditor::new(&config.pipeline.editor)),
        tests: Arc::new(test_runner::PytestRunner),
    };

    if args.auto_fix_tests {
        let options = PipelineOptions {
            root,
            ..PipelineOptions::default()
        };
        let report = Pipeline::new(&config, options, collab)
            .auto_fix_tests(args.max_fix_attempts)
            .await
            .context("auto-fix failed")?;
        eprintln!("Results saved in {}", report.run_dir.display());
        return Ok(());
    }

    if args.prompt_file.is_none() && args.resume.is_none() {
        eprintln!(
            "{}",
            "No prompt file provided. The prompt file will be opened in your editor.".yellow()
        );
    }
    let options = PipelineOptions {
        root,
        prompt_file: args.prompt_file,
        resume: args.resume,
    };

    let summary = Pipeline::new(&config, options, collab)
        .run()
        .await
        .context("pipeline failed")?;
    if !summary.run_dir.as_os_str().is_empty() {
        eprintln!("Results saved in {}", summary.run_dir.display());
    }
    Ok(())
}

/// Build the smart and initial context for a request.
async fn run_context(args: ContextArgs, env: &Env) -> Result<()> {
    let root = resolve_root(&args.path).await?;
    let config = load_config(&root, env, args.include_tests)?;

    let run_dir = run::RunDir::create(&root.join(&config.pipeline.runs_dir))
        .context("failed to create run directory")?;
    let builder = selection::SmartContextBuilder::new(
        &root,
        &config.context,
        fast_model(&config)?,
        token_counter(&config, env)?,
        confirm_for(args.yes),
    );
    let smart = builder
        .build(&args.request, &run_dir)
        .await
        .context("failed to build smart context")?;
    let texts = context::ProjectTexts::load(&root).await?;
    let initial = context::build_initial_context(&smart.text, &texts);
    run_dir.write(constants::INITIAL_CONTEXT_FILE, &initial)?;

    match args.output {
        Some(path) => {
            run::write_creating_parents(&path, &initial)?;
            eprintln!(
                "{} {} files, {} tokens, written to {}",
                "✔".green().bold(),
                smart.files.len(),
                smart.total_tokens,
                path.display()
            );
        }
        None => println!("{initial}"),
    }
    Ok(())
}

/// Parse a saved reply and print the processed instructions.
async fn run_parse(args: ParseArgs) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let reply = instructions::process_reply(&raw);
    let set = reply.grouped();
    println!(
        "{}",
        instructions::ProcessedInstructions::new(&reply, &set).to_json()?
    );
    Ok(())
}

/// List tracked text files that would be offered as context.
async fn run_files(args: PathArgs, env: &Env) -> Result<()> {
    let root = resolve_root(&args.path).await?;
    let config = load_config(&root, env, args.include_tests)?;
    let tracked = files::list_tracked_files(&root)
        .await
        .context("failed to list files")?;
    let assembler = context::ContextAssembler::new(&root, &config.context);
    for file in tracked.iter().filter(|f| assembler.should_include(&f.relative)) {
        println!("{}", file.relative);
    }
    Ok(())
}

/// Print the declaration index.
async fn run_declarations(args: PathArgs, env: &Env) -> Result<()> {
    let root = resolve_root(&args.path).await?;
    let config = load_config(&root, env, args.include_tests)?;
    let tracked = files::list_tracked_files(&root)
        .await
        .context("failed to list files")?;
    let assembler = context::ContextAssembler::new(&root, &config.context);
    let candidates: Vec<_> = tracked
        .into_iter()
        .filter(|f| assembler.should_include(&f.relative))
        .collect();

    let mut extractor = declarations::DeclarationExtractor::new()
        .context("failed to initialise the declaration parser")?;
    let index = extractor.build_index(&candidates).await;
    println!("{}", declarations::format_for_llm(&index));
    Ok(())
}
