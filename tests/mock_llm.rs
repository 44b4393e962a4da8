//! End-to-end pipeline runs against scripted collaborators.
//!
//! No network, no terminal and no git: models answer by prompt shape,
//! confirmations follow a fixed policy and the editor leaves files alone.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use patchsmith::config::Config;
use patchsmith::constants;
use patchsmith::conversation::{CONTEXT_ACKNOWLEDGEMENT, ConversationState};
use patchsmith::interact::{Confirm, Editor, InputError};
use patchsmith::models::{ChatMessage, Role};
use patchsmith::files::git;
use patchsmith::pipeline::autofix::FixOutcome;
use patchsmith::pipeline::{CONTINUE_QUESTION, Collaborators, Pipeline, PipelineOptions};
use patchsmith::providers::{LanguageModel, ProviderError, TokenCounter};
use patchsmith::test_runner::TestRunner;

const REPLY: &str = "###COMMIT: Add greeting helper
I'll add a helper and call it.

###PATCH: app.py
```python
call greet() from main
```

###NEW: util.py
```python
def greet():
    return 'hi'
```

###BASH: setup.sh
```bash
pip install -r requirements.txt
```

Let me know if you need anything else.";

/// Instruction model: one canned reply, calls counted.
struct MainModel {
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MainModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LanguageModel for MainModel {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        _system: Option<&str>,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        Ok(REPLY.to_string())
    }

    fn model(&self) -> &str {
        "main"
    }
}

/// Fast and large tier: answers by what the prompt asks for.
struct HelperModel;

#[async_trait]
impl LanguageModel for HelperModel {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        _system: Option<&str>,
    ) -> Result<String, ProviderError> {
        let prompt = &messages[messages.len() - 1].content;
        if prompt.contains("<original>") {
            Ok("```python\ndef main():\n    print(greet())\n```".to_string())
        } else if prompt.starts_with("Summarize") {
            Ok("Entry point.".to_string())
        } else {
            Ok("app.py".to_string())
        }
    }

    fn model(&self) -> &str {
        "helper"
    }
}

struct CharCounter;

#[async_trait]
impl TokenCounter for CharCounter {
    async fn count(&self, text: &str) -> Result<usize, ProviderError> {
        Ok(text.chars().count())
    }
}

/// Approves everything except continuing the conversation.
struct OneTurn;

#[async_trait]
impl Confirm for OneTurn {
    async fn confirm(&self, question: &str) -> bool {
        question != CONTINUE_QUESTION
    }
}

struct Untouched;

#[async_trait]
impl Editor for Untouched {
    async fn edit(&self, _path: &Path) -> Result<(), InputError> {
        Ok(())
    }
}

/// Replays outputs in order, repeating the last one.
struct ScriptedTests(Mutex<Vec<&'static str>>);

impl ScriptedTests {
    fn new(outputs: &[&'static str]) -> Arc<Self> {
        let mut outputs = outputs.to_vec();
        outputs.reverse();
        Arc::new(Self(Mutex::new(outputs)))
    }
}

#[async_trait]
impl TestRunner for ScriptedTests {
    async fn run(&self, _root: &Path) -> String {
        let mut outputs = self.0.lock().unwrap();
        let next = if outputs.len() > 1 { outputs.pop() } else { outputs.last().copied() };
        next.unwrap_or_default().to_string()
    }
}

/// Declines further repair passes, approves everything else.
struct SinglePass;

#[async_trait]
impl Confirm for SinglePass {
    async fn confirm(&self, question: &str) -> bool {
        !question.starts_with("Attempt ")
    }
}

const FAILING: &str = "collected 1 item\n\nFAILED test_app.py::test_main - AssertionError\n1 failed in 0.01s";
const PASSING: &str = "collected 1 item\n\ntest_app.py .\n1 passed in 0.01s";

fn collaborators(main: Arc<MainModel>) -> Collaborators {
    Collaborators {
        main,
        fast: Arc::new(HelperModel),
        large: Arc::new(HelperModel),
        counter: Arc::new(CharCounter),
        confirm: Arc::new(OneTurn),
        editor: Arc::new(Untouched),
        tests: ScriptedTests::new(&[FAILING]),
    }
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.py"), "def main():\n    print('hello')\n").unwrap();
    std::fs::write(dir.path().join("models.py"), "class User:\n    pass\n").unwrap();
    std::fs::write(dir.path().join("prompt.md"), "Add a greeting helper\n").unwrap();
    dir
}

#[tokio::test]
async fn one_turn_applies_all_instruction_kinds() {
    let dir = project();
    let root = dir.path();
    let main = MainModel::new();
    let options = PipelineOptions {
        root: root.to_path_buf(),
        prompt_file: Some(root.join("prompt.md")),
        resume: None,
    };

    let summary = Pipeline::new(&Config::default(), options, collaborators(main.clone()))
        .run()
        .await
        .unwrap();
    assert_eq!(summary.turns, 1);
    assert!(!summary.cancelled);
    assert_eq!(main.calls.load(Ordering::SeqCst), 1);

    // Edits landed in the project.
    assert_eq!(
        std::fs::read_to_string(root.join("app.py")).unwrap(),
        "def main():\n    print(greet())"
    );
    assert_eq!(
        std::fs::read_to_string(root.join("util.py")).unwrap(),
        "def greet():\n    return 'hi'"
    );
    assert!(root.join("bash_scripts/setup.sh").exists());

    // The model saw the context exchange, then the prompt.
    let sent = main.seen.lock().unwrap()[0].clone();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].content.starts_with("<context>"));
    assert!(sent[0].content.contains("*** SMART CONTEXT ***"));
    assert!(sent[0].content.contains("###FILENAME: app.py"));
    assert_eq!(sent[1].content, CONTEXT_ACKNOWLEDGEMENT);
    assert_eq!(sent[2].content, "Add a greeting helper");

    // Artifacts.
    let run = &summary.run_dir;
    assert_eq!(
        std::fs::read_to_string(run.join("raw_instructions_turn_1.md")).unwrap(),
        REPLY
    );
    let processed: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(run.join(constants::PROCESSED_INSTRUCTIONS_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(processed["commit_name"], "Add greeting helper");
    assert_eq!(processed["patches"][0]["file_path"], "app.py");
    assert!(processed["patches"][0]["processed_path"]
        .as_str()
        .unwrap()
        .ends_with("app.py"));
    assert!(run.join("patches/app.py.diff").exists());
    assert!(run.join("patches/app.py.applied.diff").exists());
    assert!(run.join("new_files/util.py").exists());
    assert!(run.join(constants::SMART_CONTEXT_FILE).exists());
    assert!(run.join(constants::INITIAL_CONTEXT_FILE).exists());
    assert!(run.join(constants::DECLARATIONS_FILE).exists());

    // Failing tests seed the next prompt.
    assert!(run.join("test_results_turn_1.txt").exists());
    let next = std::fs::read_to_string(run.join("prompt_2.md")).unwrap();
    assert!(next.contains("## Failed Test Results"));

    let state = ConversationState::load(&run.join(constants::STATE_FILE))
        .unwrap()
        .unwrap();
    assert!(state.smart_context_added);
    assert_eq!(state.turn_number, 1);
    let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn resume_applies_saved_instructions_without_asking_the_model() {
    let dir = project();
    let root = dir.path();
    let run = root.join("runs").join("2024-01-01_00-00-00");
    std::fs::create_dir_all(&run).unwrap();
    let raw = run.join("raw_instructions_turn_1.md");
    std::fs::write(&raw, REPLY).unwrap();

    let main = MainModel::new();
    let options = PipelineOptions {
        root: root.to_path_buf(),
        prompt_file: None,
        resume: Some(raw),
    };
    let summary = Pipeline::new(&Config::default(), options, collaborators(main.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.run_dir, run);
    assert_eq!(main.calls.load(Ordering::SeqCst), 0);
    assert!(root.join("util.py").exists());
    assert!(run.join(constants::PROCESSED_INSTRUCTIONS_FILE).exists());
}

#[tokio::test]
async fn empty_prompt_ends_the_run_before_any_model_call() {
    let dir = project();
    let root = dir.path();
    std::fs::write(root.join("prompt.md"), "   \n").unwrap();
    let main = MainModel::new();
    let options = PipelineOptions {
        root: root.to_path_buf(),
        prompt_file: Some(root.join("prompt.md")),
        resume: None,
    };

    let summary = Pipeline::new(&Config::default(), options, collaborators(main.clone()))
        .run()
        .await
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(main.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        std::fs::read_to_string(root.join("app.py")).unwrap(),
        "def main():\n    print('hello')\n"
    );
}

fn options(root: &Path) -> PipelineOptions {
    PipelineOptions {
        root: root.to_path_buf(),
        ..PipelineOptions::default()
    }
}

#[tokio::test]
async fn auto_fix_applies_the_reply_until_tests_pass() {
    let dir = project();
    let root = dir.path();
    let main = MainModel::new();
    let collab = Collaborators {
        tests: ScriptedTests::new(&[FAILING, PASSING]),
        ..collaborators(main.clone())
    };

    let report = Pipeline::new(&Config::default(), options(root), collab)
        .auto_fix_tests(3)
        .await
        .unwrap();

    assert_eq!(report.outcome, FixOutcome::Passing);
    assert_eq!(report.attempts, 1);
    assert_eq!(main.calls.load(Ordering::SeqCst), 1);
    let sent = main.seen.lock().unwrap()[0].clone();
    assert!(sent[2]
        .content
        .starts_with("Focus on fixing only the first failed test: test_main."));
    assert_eq!(
        std::fs::read_to_string(root.join("app.py")).unwrap(),
        "def main():\n    print(greet())"
    );
    let run = &report.run_dir;
    assert!(run.join("raw_instructions_turn_1.md").exists());
    assert!(std::fs::read_to_string(run.join("test_results_fix_0.txt")).unwrap().contains("FAILED"));
    assert!(std::fs::read_to_string(run.join("test_results_fix_1.txt")).unwrap().contains("1 passed"));
}

#[tokio::test]
async fn auto_fix_stops_when_another_pass_is_declined() {
    let dir = project();
    let main = MainModel::new();
    let collab = Collaborators {
        tests: ScriptedTests::new(&[FAILING]),
        confirm: Arc::new(SinglePass),
        ..collaborators(main.clone())
    };

    let report = Pipeline::new(&Config::default(), options(dir.path()), collab)
        .auto_fix_tests(3)
        .await
        .unwrap();

    assert_eq!(report.outcome, FixOutcome::StillFailing);
    assert_eq!(report.attempts, 1);
    assert_eq!(main.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auto_fix_leaves_passing_suites_alone() {
    let dir = project();
    let main = MainModel::new();
    let collab = Collaborators {
        tests: ScriptedTests::new(&[PASSING]),
        ..collaborators(main.clone())
    };

    let report = Pipeline::new(&Config::default(), options(dir.path()), collab)
        .auto_fix_tests(3)
        .await
        .unwrap();

    assert_eq!(report.outcome, FixOutcome::AlreadyPassing);
    assert_eq!(report.attempts, 0);
    assert_eq!(main.calls.load(Ordering::SeqCst), 0);
}

fn git_in(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
        .status;
    assert!(status.success(), "git {args:?} failed");
}

#[tokio::test]
async fn clean_feature_branch_is_merged_into_main_at_startup() {
    let dir = project();
    let root = dir.path();
    git_in(root, &["init", "-b", "main"]);
    git_in(root, &["config", "user.email", "test@test.com"]);
    git_in(root, &["config", "user.name", "Test"]);
    git_in(root, &["add", "."]);
    git_in(root, &["commit", "-m", "init"]);
    git_in(root, &["checkout", "-b", "2024-01-01_00-00-00_feature"]);
    std::fs::write(root.join("app.py"), "def main():\n    print('feature')\n").unwrap();
    git_in(root, &["commit", "-am", "feature"]);

    let main = MainModel::new();
    let summary = Pipeline::new(&Config::default(), options(root), collaborators(main.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.merged_branch.as_deref(), Some("2024-01-01_00-00-00_feature"));
    assert!(summary.cancelled);
    assert_eq!(main.calls.load(Ordering::SeqCst), 0);
    assert_eq!(git::current_branch(root).await.as_deref(), Some("main"));
    assert_eq!(
        std::fs::read_to_string(root.join("app.py")).unwrap(),
        "def main():\n    print('feature')\n"
    );
}
