//! Raw replies through parsing and file operations.

use pretty_assertions::assert_eq;

use patchsmith::instructions::{ProcessedInstructions, process_reply};
use patchsmith::models::EditInstruction;
use patchsmith::operator::FileOperator;
use patchsmith::run::RunDir;

const REPLY: &str = "Here is the plan.
###COMMIT: Split helpers

###NEW: pkg/helpers.py
```python
def slug(s):
    return s.lower()
```

###DELETE: old.py
```
```

###PATCH: pkg/app.py
```
use slug() from helpers
```

###NEW: ../outside.py
```
nope
```

###BASH: migrate.sh
```bash
echo done
```
Run the tests afterwards.";

#[test]
fn reply_splits_into_typed_instructions() {
    let reply = process_reply(REPLY);
    assert_eq!(reply.commit_name.as_deref(), Some("Split helpers"));
    assert_eq!(reply.preamble.as_deref(), Some("Here is the plan.\n###COMMIT: Split helpers"));
    assert_eq!(reply.postamble.as_deref(), Some("Run the tests afterwards."));

    let ignored: Vec<_> = reply
        .instructions
        .iter()
        .filter(|i| matches!(i, EditInstruction::Ignored { .. }))
        .collect();
    assert_eq!(ignored.len(), 1);

    let set = reply.grouped();
    assert_eq!(set.new_files.len(), 2);
    assert_eq!(set.new_files[0].content, "def slug(s):\n    return s.lower()");
    assert_eq!(set.patches[0].patch_content, "use slug() from helpers");
    assert_eq!(set.bash_scripts[0].script_name, "migrate.sh");
}

#[test]
fn operator_writes_inside_the_project_only() {
    let project = tempfile::tempdir().unwrap();
    let run = RunDir::create(&project.path().join("runs")).unwrap();
    let reply = process_reply(REPLY);
    let mut set = reply.grouped();

    let report = FileOperator::new(project.path(), &run).process(&mut set);

    assert_eq!(
        std::fs::read_to_string(project.path().join("pkg/helpers.py")).unwrap(),
        "def slug(s):\n    return s.lower()"
    );
    assert!(!project.path().join("../outside.py").exists());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "../outside.py");
    assert_eq!(
        std::fs::read_to_string(project.path().join("bash_scripts/migrate.sh")).unwrap(),
        "echo done"
    );

    let staged = run.read("patches/pkg__app.py.diff").unwrap();
    assert!(staged.starts_with("Original file: pkg/app.py\n```diff\n"));
    assert_eq!(set.patches[0].processed_path.as_deref(), Some(report.staged[0].as_path()));

    let json: serde_json::Value =
        serde_json::from_str(&ProcessedInstructions::new(&reply, &set).to_json().unwrap()).unwrap();
    assert_eq!(json["commit_name"], "Split helpers");
    assert!(json["patches"][0]["processed_path"].as_str().unwrap().ends_with("app.py.diff"));
}
