//! End-to-end reconcile scenarios against the in-memory repository.
//!
//! Each test drives `reconcile` the way the HTTP front door does and asserts
//! on the remote state and on which remote calls were made.

use pretty_assertions::assert_eq;

use ingestion::fakes::{InMemoryRepository, RecordedCall};
use ingestion::{
    AllowList, FileChange, FilePath, IngestError, IngestRequest, IngestionSettings,
    RepositoryError, RepositoryId, SectionMarkers, StaticTokenProvider, TransformSpec,
};
use reconciler::{describe_submission, reconcile};

const ALLOW_ALL: &str =
    r#"[{"repo": "acme/site$", "branch_suffix": ".*", "files": {"path": ".*", "content": "(?s).*"}}]"#;

const HEAD: &str = "acme:repo-ingestion-feature-1";
const BRANCH: &str = "repo-ingestion-feature-1";

fn file(path: &str, content: &str) -> FileChange {
    FileChange {
        path: FilePath::new(path).unwrap(),
        content: content.to_string(),
        transforms: Vec::new(),
    }
}

fn request(files: Vec<FileChange>) -> IngestRequest {
    IngestRequest {
        repository: RepositoryId::new("acme/site").unwrap(),
        branch_suffix: "feature-1".to_string(),
        files,
    }
}

struct Harness {
    repo: InMemoryRepository,
    tokens: StaticTokenProvider,
    allow_list: AllowList,
    settings: IngestionSettings,
}

impl Harness {
    fn new() -> Self {
        Self {
            repo: InMemoryRepository::default(),
            tokens: StaticTokenProvider::new("test-token"),
            allow_list: AllowList::from_json(ALLOW_ALL).unwrap(),
            settings: IngestionSettings::default(),
        }
    }

    async fn run(&self, request: IngestRequest) -> Result<String, IngestError> {
        reconcile(
            request,
            &self.allow_list,
            &self.repo,
            &self.tokens,
            &self.settings,
        )
        .await
        .map(|outcome| outcome.pr_url)
    }
}

#[tokio::test]
async fn create_path_builds_branch_file_and_pull_request() {
    let h = Harness::new();

    let url = h
        .run(request(vec![file("data/users.yml", "alice: admin\n")]))
        .await
        .unwrap();

    assert_eq!(
        h.repo.branch_tip(BRANCH).as_deref(),
        Some("0000000000000000000000000000000000000001")
    );
    assert_eq!(
        h.repo.file(BRANCH, "data/users.yml").as_deref(),
        Some("alice: admin\n")
    );

    let prs = h.repo.pull_requests();
    assert_eq!(prs.len(), 1);
    let pr = &prs[0];
    assert_eq!(pr.url, url);
    assert_eq!(pr.head_ref, HEAD);
    assert_eq!(pr.base_ref, "main");
    assert!(pr.title.contains(HEAD), "{}", pr.title);

    let markers = SectionMarkers::default();
    let expected_body = describe_submission(&[file("data/users.yml", "")]);
    assert_eq!(pr.body, markers.merge_managed("", &expected_body));
    assert!(pr.body.contains("* data/users.yml\n"));
}

#[tokio::test]
async fn replay_performs_no_writes() {
    let h = Harness::new();
    let req = request(vec![
        file("a.txt", "one"),
        file("b.txt", "two"),
    ]);

    let first = h.run(req.clone()).await.unwrap();
    h.repo.clear_calls();
    let second = h.run(req).await.unwrap();

    assert_eq!(first, second);
    // The branch create attempt is reported as "already exists", not a write.
    let writes: Vec<_> = h
        .repo
        .calls()
        .into_iter()
        .filter(|c| c.is_write() && !matches!(c, RecordedCall::CreateBranch { .. }))
        .collect();
    assert_eq!(writes, Vec::<RecordedCall>::new());
    assert_eq!(h.repo.pull_requests().len(), 1);
}

#[tokio::test]
async fn changed_content_updates_file_and_unchanged_file_is_skipped() {
    let h = Harness::new();
    h.run(request(vec![file("a.txt", "one"), file("b.txt", "two")]))
        .await
        .unwrap();
    h.repo.clear_calls();

    h.run(request(vec![file("a.txt", "one"), file("b.txt", "TWO")]))
        .await
        .unwrap();

    let calls = h.repo.calls();
    assert!(calls.contains(&RecordedCall::UpdateFile {
        path: "b.txt".to_string()
    }));
    assert!(!calls.contains(&RecordedCall::UpdateFile {
        path: "a.txt".to_string()
    }));
    assert_eq!(h.repo.file(BRANCH, "b.txt").as_deref(), Some("TWO"));
    // Same file list, so the managed section is unchanged and no edit is made.
    assert!(!calls
        .iter()
        .any(|c| matches!(c, RecordedCall::EditPullRequest { .. })));
}

#[tokio::test]
async fn files_are_written_in_request_order() {
    let h = Harness::new();
    h.run(request(vec![
        file("z.txt", "z"),
        file("a.txt", "a"),
        file("m.txt", "m"),
    ]))
    .await
    .unwrap();

    let created: Vec<String> = h
        .repo
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RecordedCall::CreateFile { path } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec!["z.txt", "a.txt", "m.txt"]);
}

#[tokio::test]
async fn new_file_list_edits_managed_section_and_keeps_operator_text() {
    let h = Harness::new();
    h.run(request(vec![file("a.txt", "one")])).await.unwrap();

    let pr = h.repo.pull_requests().remove(0);
    let edited = format!("Reviewer notes: please check\n\n{}\n\nThanks!", pr.body.trim());
    h.repo.set_pull_request_body(pr.number, &edited);
    h.repo.clear_calls();

    h.run(request(vec![file("a.txt", "one"), file("b.txt", "two")]))
        .await
        .unwrap();

    assert!(h
        .repo
        .calls()
        .contains(&RecordedCall::EditPullRequest {
            number: pr.number.as_u64()
        }));
    let body = h.repo.pull_requests().remove(0).body;
    assert!(body.starts_with("Reviewer notes: please check"), "{body}");
    assert!(body.ends_with("Thanks!"), "{body}");
    assert!(body.contains("* a.txt\n* b.txt\n"), "{body}");
    assert_eq!(body.matches("tags: repo-ingestion").count(), 1);
}

#[tokio::test]
async fn changed_title_triggers_edit() {
    let h = Harness::new();
    let managed = describe_submission(&[file("a.txt", "")]);
    let markers = SectionMarkers::default();
    h.repo
        .seed_pull_request(HEAD, "main", "Old title", &markers.merge_managed("", &managed));

    h.run(request(vec![file("a.txt", "one")])).await.unwrap();

    let pr = h.repo.pull_requests().remove(0);
    assert_eq!(pr.title, format!("Create or update files: {HEAD}"));
    assert!(h
        .repo
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::EditPullRequest { .. })));
}

#[tokio::test]
async fn existing_pull_request_without_section_gets_one_appended() {
    let h = Harness::new();
    h.repo
        .seed_pull_request(HEAD, "main", "Manual PR", "Opened by hand.");

    h.run(request(vec![file("a.txt", "one")])).await.unwrap();

    let prs = h.repo.pull_requests();
    assert_eq!(prs.len(), 1);
    assert!(prs[0].body.starts_with("Opened by hand.\n\n"));
    assert!(prs[0].body.contains("* a.txt"));
}

#[tokio::test]
async fn duplicate_pull_requests_are_an_invariant_violation() {
    let h = Harness::new();
    h.repo.seed_pull_request(HEAD, "main", "one", "");
    h.repo.seed_pull_request(HEAD, "main", "two", "");

    let err = h.run(request(vec![file("a.txt", "one")])).await.unwrap_err();

    assert!(matches!(err, IngestError::InvariantViolation { .. }), "{err:?}");
    assert!(!h
        .repo
        .calls()
        .iter()
        .any(|c| matches!(
            c,
            RecordedCall::EditPullRequest { .. } | RecordedCall::CreatePullRequest { .. }
        )));
}

#[tokio::test]
async fn unauthorized_request_makes_no_remote_calls() {
    let h = Harness::new();
    let mut req = request(vec![file("a.txt", "one")]);
    req.repository = RepositoryId::new("evil/site").unwrap();

    let err = h.run(req).await.unwrap_err();

    assert!(matches!(err, IngestError::Unauthorized { .. }));
    assert_eq!(h.repo.calls(), Vec::<RecordedCall>::new());
}

#[tokio::test]
async fn content_failing_rule_is_rejected_before_remote_calls() {
    let mut h = Harness::new();
    h.allow_list = AllowList::from_json(
        r#"[{"repo": "acme/site", "branch_suffix": ".*", "files": {"path": ".*", "content": "[a-z]+$"}}]"#,
    )
    .unwrap();

    let err = h
        .run(request(vec![file("a.txt", "ok"), file("b.txt", "NOT OK")]))
        .await
        .unwrap_err();

    let IngestError::Unauthorized { reason } = err else {
        panic!("expected Unauthorized");
    };
    assert!(reason.contains("b.txt"));
    assert!(h.repo.calls().is_empty());
}

#[tokio::test]
async fn transforms_run_before_write() {
    let h = Harness::new();
    let mut f = file("data/config.yml", r#"{"name": "site", "replicas": 3}"#);
    f.transforms = vec![TransformSpec::JsonToYaml];

    h.run(request(vec![f])).await.unwrap();

    assert_eq!(
        h.repo.file(BRANCH, "data/config.yml").as_deref(),
        Some("name: site\nreplicas: 3\n")
    );
}

#[tokio::test]
async fn transform_failure_blocks_all_remote_mutation() {
    let h = Harness::new();
    let mut bad = file("b.yml", "{not json");
    bad.transforms = vec![TransformSpec::JsonToYaml];

    let err = h
        .run(request(vec![file("a.txt", "fine"), bad]))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::MalformedInput { .. }));
    assert!(h.repo.calls().is_empty());
}

#[tokio::test]
async fn unknown_transform_is_rejected() {
    let h = Harness::new();
    let mut f = file("a.ini", "x=1");
    f.transforms = vec![TransformSpec::Unrecognized("toml2ini".to_string())];

    let err = h.run(request(vec![f])).await.unwrap_err();

    assert!(matches!(err, IngestError::UnsupportedTransform { .. }));
    assert!(h.repo.calls().is_empty());
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let h = Harness::new();
    h.run(request(vec![file("a.txt", "one")])).await.unwrap();
    h.repo.race_next_update("a.txt");

    let err = h
        .run(request(vec![file("a.txt", "changed")]))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Conflict { ref path } if path.as_str() == "a.txt"));
    assert_eq!(h.repo.file(BRANCH, "a.txt").as_deref(), Some("one"));
}

#[tokio::test]
async fn existing_branch_is_not_reset() {
    let h = Harness::new();
    h.run(request(vec![file("a.txt", "one")])).await.unwrap();
    let tip_before = h.repo.branch_tip(BRANCH);

    h.run(request(vec![file("a.txt", "one")])).await.unwrap();

    assert_eq!(h.repo.branch_tip(BRANCH), tip_before);
}

#[tokio::test]
async fn branch_creation_failure_aborts_before_files() {
    let h = Harness::new();
    h.repo
        .fail("create_branch", RepositoryError::http(403, "Resource not accessible"));

    let err = h.run(request(vec![file("a.txt", "one")])).await.unwrap_err();

    assert!(matches!(err, IngestError::Remote { operation: "create branch", .. }));
    assert!(!h
        .repo
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::GetFile { .. } | RecordedCall::CreateFile { .. })));
}

#[tokio::test]
async fn read_failure_other_than_not_found_is_fatal() {
    let h = Harness::new();
    h.repo.fail("get_file", RepositoryError::http(500, "boom"));

    let err = h.run(request(vec![file("a.txt", "one")])).await.unwrap_err();

    assert!(matches!(err, IngestError::Remote { operation: "read file", .. }));
    assert_eq!(h.repo.file(BRANCH, "a.txt"), None);
}

#[tokio::test]
async fn failure_midway_keeps_earlier_writes_and_replay_converges() {
    let h = Harness::new();
    h.repo
        .fail("create_pull_request", RepositoryError::http(502, "Bad Gateway"));

    let err = h.run(request(vec![file("a.txt", "one")])).await.unwrap_err();
    assert!(matches!(err, IngestError::Remote { .. }));
    assert!(matches!(
        err.retry_policy(),
        ingestion::RetryPolicy::Retryable { .. }
    ));
    assert_eq!(h.repo.file(BRANCH, "a.txt").as_deref(), Some("one"));

    h.repo.recover("create_pull_request");
    h.repo.clear_calls();
    h.run(request(vec![file("a.txt", "one")])).await.unwrap();

    assert_eq!(h.repo.pull_requests().len(), 1);
    assert!(!h
        .repo
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::CreateFile { .. } | RecordedCall::UpdateFile { .. })));
}

#[tokio::test]
async fn calls_carry_the_provider_token() {
    let h = Harness::new();
    h.repo.require_token("other-token");

    let err = h.run(request(vec![file("a.txt", "one")])).await.unwrap_err();

    let IngestError::Remote { source, .. } = err else {
        panic!("expected Remote");
    };
    assert_eq!(source.status, Some(401));
}
