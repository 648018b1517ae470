//! End-to-end runs over CSV recipient lists, `.eml` drafts and the outbox.

use assert_fs::prelude::*;
use predicates::prelude::*;

use mailmerge::dispatch::{spawn, Controller, Job, RunOutcome, RunPlan, RunSettings};
use mailmerge::store::{CheckpointStore, CsvSource};
use mailmerge::template::EmlDrafts;
use mailmerge::transport::{OutboxTransport, Sender};

const DRAFT: &str = "Subject: Hello {{Name}}\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Dear {{Name}}, {{Company}}</p>\r\n";

struct Fixture {
    temp: assert_fs::TempDir,
}

impl Fixture {
    fn new(list: &str) -> Self {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("list.csv").write_str(list).unwrap();
        temp.child("drafts/welcome.eml").write_str(DRAFT).unwrap();
        Self { temp }
    }

    fn checkpoint(&self) -> CheckpointStore {
        CheckpointStore::for_rows(
            self.temp.child("list.csv").path(),
            self.temp.child("cache").path(),
        )
    }

    fn job(&self, plan: RunPlan) -> Job {
        Job {
            templates: Box::new(EmlDrafts::new(self.temp.child("drafts").path())),
            rows: Box::new(CsvSource::new(self.temp.child("list.csv").path(), b',')),
            transport: Box::new(OutboxTransport::new(self.temp.child("outbox").path()).unwrap()),
            checkpoint: self.checkpoint(),
            plan,
        }
    }

    fn outbox_files(&self) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(self.temp.child("outbox").path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

fn controller() -> Controller {
    Controller::new(RunSettings {
        sender: Sender {
            display_name: "Events".into(),
            email: "events@x.com".into(),
        },
        ..RunSettings::default()
    })
}

#[test]
fn test_csv_run_writes_status_columns_and_outbox() {
    let fx = Fixture::new("Name,Email,Company\nAnn,ann@x.com,Acme\nBob,,\nCid,cid@x.com,\n");

    let handle = spawn(controller(), fx.job(RunPlan::fresh("welcome"))).unwrap();
    assert_eq!(handle.join(), RunOutcome::Completed { sent: 2, failed: 0 });

    fx.temp.child("list.csv").assert(
        "Name,Email,Company,Status,Stop,Resume\n\
         Ann,ann@x.com,Acme,Sent,,\n\
         Bob,,,,,\n\
         Cid,cid@x.com,,Sent,,\n",
    );

    let files = fx.outbox_files();
    assert_eq!(files.len(), 2);
    let first = std::fs::read_to_string(&files[0]).unwrap();
    assert!(first.contains("Subject: Hello Ann"));
    assert!(first.contains("To: ann@x.com"));
    assert!(first.contains("Events <events@x.com>"));

    fx.temp
        .child(".list.csv.mailmerge.json")
        .assert(predicate::path::missing());
}

#[test]
fn test_csv_stop_and_resume_round() {
    let fx = Fixture::new("Name,Email\nAnn,ann@x.com\nBob,bob@x.com\n");

    let stopping = controller();
    stopping.cancel_token().cancel();
    let handle = spawn(stopping, fx.job(RunPlan::fresh("welcome"))).unwrap();
    assert!(matches!(
        handle.join(),
        RunOutcome::Stopped {
            sent: 0,
            resume_row: 2,
            ..
        }
    ));

    let sidecar = fx.temp.child(".list.csv.mailmerge.json");
    sidecar.assert(predicate::str::contains("\"last_row\": 2"));
    fx.temp
        .child("list.csv")
        .assert(predicate::str::contains("Ann,ann@x.com,,Stopped,"));

    let plan = RunPlan::resume("welcome", &fx.checkpoint()).unwrap();
    let handle = spawn(controller(), fx.job(plan)).unwrap();
    assert_eq!(handle.join(), RunOutcome::Completed { sent: 2, failed: 0 });

    fx.temp.child("list.csv").assert(
        "Name,Email,Status,Stop,Resume\n\
         Ann,ann@x.com,Sent,Stopped,Resumed\n\
         Bob,bob@x.com,Sent,,\n",
    );
    sidecar.assert(predicate::path::missing());
    assert_eq!(fx.outbox_files().len(), 2);
}

#[test]
fn test_existing_control_columns_are_reused() {
    let fx = Fixture::new("Email,status\nann@x.com,Sent\nbob@x.com,\n");

    let handle = spawn(controller(), fx.job(RunPlan::fresh("welcome"))).unwrap();
    assert_eq!(handle.join(), RunOutcome::Completed { sent: 2, failed: 0 });

    fx.temp
        .child("list.csv")
        .assert(predicate::str::starts_with("Email,status,Stop,Resume\n"));
}

#[test]
fn test_missing_draft_leaves_list_untouched() {
    let list = "Email\nann@x.com\n";
    let fx = Fixture::new(list);

    let handle = spawn(controller(), fx.job(RunPlan::fresh("no-such-draft"))).unwrap();
    assert!(matches!(handle.join(), RunOutcome::Failed { .. }));

    fx.temp.child("list.csv").assert(list);
    fx.temp
        .child(".list.csv.mailmerge.json")
        .assert(predicate::path::missing());
}
