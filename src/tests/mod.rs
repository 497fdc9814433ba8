use serde_json::json;

use crate::{
    hierarchy::{FileId, Hierarchy, OptionPath, PageId},
    pending::PendingFile,
    probe::FileLayout,
    reconcile,
    script::{self, Edit},
    selection::PageFileRef,
    session::{Session, SubmitError},
    state::EditorState,
    storage::MemoryClient,
    submit::{DebugBackend, SubmitRequest},
};

const COLOR: &str = r#"{ "Color": { "selected": "Red", "options": { "Red": { "fileId": "f1" } } } }"#;

fn path(segments: &[&str]) -> OptionPath {
    OptionPath::new(segments.iter().copied())
}

fn svg(name: &str) -> PendingFile {
    PendingFile::new(name, format!("<svg id=\"{name}\"/>").into_bytes())
}

#[test]
fn test_add_nested_leaf() {
    let state = EditorState::load(Hierarchy::from_json(COLOR).unwrap());
    let state = state.add_branch(&path(&["Color"]), "Finish").unwrap();
    assert_eq!(
        serde_json::to_value(state.hierarchy()).unwrap()["Color"]["options"]["Finish"],
        json!({ "selected": " ", "options": {} })
    );

    let matte = FileId::new("f2");
    let state = state
        .attach_file(&matte, &PageId::new("front"), svg("matte.svg"))
        .add_leaf(&path(&["Color", "Finish"]), "Matte", &matte)
        .unwrap();
    assert_eq!(
        serde_json::to_value(state.hierarchy()).unwrap(),
        json!({
            "Color": {
                "selected": "Red",
                "options": {
                    "Red": { "fileId": "f1" },
                    "Finish": {
                        "selected": " ",
                        "options": { "Matte": { "fileId": "f2" } }
                    }
                }
            }
        })
    );
}

#[test]
fn test_rename_to_same_name() {
    let state = EditorState::load(Hierarchy::from_json(COLOR).unwrap());
    let renamed = state.rename(&path(&["Color", "Red"]), "Red").unwrap();
    assert_eq!(renamed, state);
}

#[test]
fn test_deleted_rows_stop_rendering() {
    let state = EditorState::load(Hierarchy::from_json(COLOR).unwrap())
        .add_branch(&path(&["Color"]), "Finish")
        .unwrap();
    let red = path(&["Color", "Red"]);
    let state = state.delete(&red).unwrap();
    assert!(!state.hierarchy().should_render(&red));
    assert_eq!(
        serde_json::to_value(state.hierarchy()).unwrap()["Color"]["selected"],
        "none"
    );
    assert!(state.intents().is_file_staged(&FileId::new("f1")));
}

#[tokio::test]
async fn test_page_toggle_roundtrip_in_session() {
    let mut session = Session::new(
        Hierarchy::from_json(COLOR).unwrap(),
        vec![PageId::new("front"), PageId::new("side")],
        FileLayout::new("/files", "svg"),
    );
    let client = MemoryClient::default()
        .with_path("/files/front/f1.svg")
        .with_path("/files/side/f1.svg");
    session.probe_all(&client).await;
    let before = session.state().clone();
    let red = path(&["Color", "Red"]);
    let side = PageId::new("side");

    session.toggle_page(&red, &side).unwrap();
    let marker = PageFileRef::new(side.clone(), FileId::new("f1"));
    assert_eq!(
        session.state().intents().delete_files_of_pages().collect::<Vec<_>>(),
        vec![&marker]
    );
    session.toggle_page(&red, &side).unwrap();
    assert_eq!(session.state(), &before);
}

#[tokio::test]
async fn test_replay_and_submit() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("matte-front.svg"), b"<svg/>")
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("red-side.svg"), b"<svg/>")
        .await
        .unwrap();
    let mut session = Session::new(
        Hierarchy::from_json(COLOR).unwrap(),
        vec![PageId::new("front"), PageId::new("side")],
        FileLayout::new("/files", "svg"),
    );
    session
        .probe_all(&MemoryClient::default().with_path("/files/front/f1.svg"))
        .await;

    let edits = script::parse(
        r#"
- op: add_branch
  parent: [Color]
  name: Finish
- op: add_leaf
  parent: [Color, Finish]
  name: Matte
  files:
    front: matte-front.svg
- op: rename
  path: [Color, Red]
  name: Crimson
- op: attach
  path: [Color, Crimson]
  page: side
  file: red-side.svg
"#,
    )
    .unwrap();
    script::replay(&mut session, &edits, dir.path()).await.unwrap();
    assert!(reconcile::ensure_complete(session.state()).is_ok());

    let request = SubmitRequest::from_state(session.state());
    assert_eq!(request.uploads.len(), 2);
    assert_eq!(
        serde_json::to_value(&request.structure).unwrap()["Color"]["selected"],
        "Crimson"
    );

    let result = session.submit(&DebugBackend::unreachable()).await;
    assert!(matches!(result, Err(SubmitError::Backend(_))));
    assert_eq!(session.state().pending().iter().count(), 2);

    let backend = DebugBackend::accepting();
    session.submit(&backend).await.unwrap();
    let requests = backend.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].uploads.len(), 2);
    assert!(session.state().pending().is_empty());
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn test_cancel_after_script_error() {
    let mut session = Session::new(
        Hierarchy::from_json(COLOR).unwrap(),
        vec![PageId::new("front")],
        FileLayout::new("/files", "svg"),
    );
    let edits = vec![
        Edit::Delete {
            path: path(&["Color", "Red"]),
        },
        Edit::AddBranch {
            parent: OptionPath::root(),
            name: "Color".into(),
        },
    ];
    let error = script::replay(&mut session, &edits, std::path::Path::new("."))
        .await
        .unwrap_err();
    assert_eq!(error.index, 1);
    assert!(session.is_dirty());
    session.cancel();
    assert!(session.should_render(&path(&["Color", "Red"])));
    assert!(session.state().intents().is_empty());
}

#[tokio::test]
async fn test_rejected_submission_is_reported() {
    let mut session = Session::new(
        Hierarchy::from_json(COLOR).unwrap(),
        vec![PageId::new("front")],
        FileLayout::new("/files", "svg"),
    );
    session
        .rename(&path(&["Color", "Red"]), "Scarlet")
        .unwrap();
    let error = session
        .submit(&DebugBackend::rejecting("Name already used"))
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "backend rejected the submission: Name already used"
    );
    assert!(session.should_render(&path(&["Color", "Scarlet"])));
}
