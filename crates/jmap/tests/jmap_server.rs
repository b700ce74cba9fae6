/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! End-to-end tests over the request executor with an in-memory IMAP
//! backend: every call goes through the same JSON envelope a client
//! would POST.

mod mock;

use std::sync::Arc;

use jmap::submission::Envelope;
use jmap::{Config, JMAP};
use serde_json::{json, Value};
use store::SqlStore;

use crate::mock::{raw_message, MailData, MockImapSession, MockSender};

fn server(data: Arc<parking_lot::Mutex<MailData>>) -> (JMAP, Arc<MockSender>) {
    let store = SqlStore::open_memory().expect("in-memory store");
    let jmap = JMAP::new(Config::default(), store);
    let sender = Arc::new(MockSender::default());
    jmap.add_account(
        "a",
        Box::new(MockImapSession::new(data)),
        sender.clone(),
        Arc::new(jmap::blob::MemoryBlobStore::new()),
    );
    (jmap, sender)
}

async fn submit(jmap: &JMAP, calls: Value) -> Vec<Value> {
    let body = json!({
        "using": ["urn:ietf:params:jmap:core", "urn:ietf:params:jmap:mail"],
        "methodCalls": calls,
    });
    let response = jmap
        .handle_request(body.to_string().as_bytes())
        .await
        .expect("request accepted");
    match serde_json::to_value(&response).expect("serializable")["methodResponses"].clone() {
        Value::Array(responses) => responses,
        other => panic!("unexpected response shape: {other}"),
    }
}

fn seeded_mail() -> Arc<parking_lot::Mutex<MailData>> {
    let mut data = MailData::new(1);
    data.add_folder("INBOX", Some("inbox"));
    data.add_folder("Archive", None);
    Arc::new(parking_lot::Mutex::new(data))
}

#[tokio::test]
async fn session_endpoint_lists_capabilities() {
    let (jmap, _) = server(seeded_mail());
    let response = jmap.handle_http("GET", "/jmap/session", None, b"").await;
    assert_eq!(response.status, 200);
    let session: Value = serde_json::from_str(&response.body).unwrap();
    for capability in [
        "urn:ietf:params:jmap:core",
        "urn:ietf:params:jmap:mail",
        "urn:ietf:params:jmap:submission",
        "urn:ietf:params:jmap:vacationresponse",
    ] {
        assert!(
            session["capabilities"].get(capability).is_some(),
            "missing {capability}"
        );
    }
    assert_eq!(session["apiUrl"], json!("/jmap"));
}

#[tokio::test]
async fn backreference_feeds_mailbox_get() {
    let (jmap, _) = server(seeded_mail());
    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/query", {"accountId": "a"}, "0"],
            ["Mailbox/get", {
                "accountId": "a",
                "#ids": {"resultOf": "0", "name": "Mailbox/query", "path": "/ids"}
            }, "1"],
        ]),
    )
    .await;

    assert_eq!(responses[1][0], json!("Mailbox/get"));
    assert_eq!(responses[1][2], json!("1"));
    let list = responses[1][1]["list"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    let mut names: Vec<&str> = list
        .iter()
        .map(|mailbox| mailbox["name"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["Archive", "INBOX"]);
    let inbox = list
        .iter()
        .find(|mailbox| mailbox["name"] == json!("INBOX"))
        .unwrap();
    assert_eq!(inbox["role"], json!("inbox"));
    assert_eq!(inbox["myRights"]["mayDelete"], json!(false));
}

#[tokio::test]
async fn mailbox_create_is_visible_to_changes_and_backend() {
    let data = seeded_mail();
    let (jmap, _) = server(data.clone());

    let responses = submit(&jmap, json!([["Mailbox/get", {"accountId": "a"}, "0"]])).await;
    let old_state = responses[0][1]["state"].clone();

    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/set", {
                "accountId": "a",
                "create": {"new": {"name": "Projects"}}
            }, "0"],
            ["Mailbox/changes", {
                "accountId": "a",
                "sinceState": old_state
            }, "1"],
        ]),
    )
    .await;

    let created = &responses[0][1]["created"]["new"];
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["totalEmails"], json!(0));
    assert_eq!(responses[1][1]["created"], json!([id]));
    assert!(data
        .lock()
        .folders
        .iter()
        .any(|folder| folder.imap_name == "Projects"));
}

#[tokio::test]
async fn mailbox_rename_keeps_child_ids() {
    let data = seeded_mail();
    data.lock().add_folder("Projects", None);
    data.lock().add_folder("Projects/2026", None);
    let (jmap, _) = server(data.clone());

    let responses = submit(&jmap, json!([["Mailbox/get", {"accountId": "a"}, "0"]])).await;
    let find = |list: &Value, name: &str| {
        list.as_array()
            .unwrap()
            .iter()
            .find(|mailbox| mailbox["name"] == json!(name))
            .unwrap()
            .clone()
    };
    let parent_id = find(&responses[0][1]["list"], "Projects")["id"]
        .as_str()
        .unwrap()
        .to_string();
    let child_id = find(&responses[0][1]["list"], "2026")["id"]
        .as_str()
        .unwrap()
        .to_string();

    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/set", {
                "accountId": "a",
                "update": {(parent_id.clone()): {"name": "Work"}}
            }, "0"],
            ["Mailbox/get", {"accountId": "a", "ids": [child_id]}, "1"],
        ]),
    )
    .await;

    assert!(responses[0][1]["updated"]
        .as_object()
        .unwrap()
        .contains_key(&parent_id));
    // The child keeps its id while its backend path moves.
    let child = &responses[1][1]["list"][0];
    assert_eq!(child["name"], json!("2026"));
    assert_eq!(child["parentId"], json!(parent_id));
    assert!(data
        .lock()
        .folders
        .iter()
        .any(|folder| folder.imap_name == "Work/2026"));
}

#[tokio::test]
async fn mailbox_set_honors_backend_delimiter() {
    // A backend with a dot hierarchy delimiter, Cyrus style.
    let data = {
        let mut data = MailData::new(1);
        data.delimiter = '.';
        data.add_folder("INBOX", Some("inbox"));
        data.add_folder("Projects", None);
        Arc::new(parking_lot::Mutex::new(data))
    };
    let (jmap, _) = server(data.clone());

    let responses = submit(&jmap, json!([["Mailbox/get", {"accountId": "a"}, "0"]])).await;
    let parent_id = responses[0][1]["list"]
        .as_array()
        .unwrap()
        .iter()
        .find(|mailbox| mailbox["name"] == json!("Projects"))
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/set", {
                "accountId": "a",
                "create": {"new": {"name": "Alpha", "parentId": parent_id}}
            }, "0"],
            ["Mailbox/set", {
                "accountId": "a",
                "update": {(parent_id.clone()): {"name": "Work"}}
            }, "1"],
        ]),
    )
    .await;

    assert!(responses[0][1]["created"]["new"].is_object());
    assert!(responses[1][1]["updated"]
        .as_object()
        .unwrap()
        .contains_key(&parent_id));
    let folders: Vec<String> = data
        .lock()
        .folders
        .iter()
        .map(|folder| folder.imap_name.clone())
        .collect();
    assert!(folders.contains(&"Work.Alpha".to_string()), "{folders:?}");
    assert!(!folders.iter().any(|name| name.contains('/')), "{folders:?}");
}

#[tokio::test]
async fn email_query_windows_by_position_and_anchor() {
    let data = seeded_mail();
    for n in 1..=5u32 {
        data.lock().append(
            &["INBOX"],
            &[],
            raw_message(
                "jane@example.com",
                "mary@example.com",
                &format!("Message {n}"),
            ),
            1_700_000_000 + i64::from(n),
        );
    }
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([
            ["Email/query", {
                "accountId": "a",
                "sort": [{"property": "receivedAt", "isAscending": true}],
                "position": 1,
                "limit": 2
            }, "0"],
            ["Email/query", {
                "accountId": "a",
                "sort": [{"property": "receivedAt", "isAscending": true}],
                "anchor": "1-3",
                "anchorOffset": -1,
                "limit": 2
            }, "1"],
            ["Email/query", {
                "accountId": "a",
                "sort": [{"property": "receivedAt", "isAscending": true}],
                "position": -2,
                "calculateTotal": true
            }, "2"],
            ["Email/query", {
                "accountId": "a",
                "position": 1,
                "anchor": "1-3"
            }, "3"],
        ]),
    )
    .await;

    assert_eq!(responses[0][1]["ids"], json!(["1-2", "1-3"]));
    assert_eq!(responses[0][1]["position"], json!(1));

    assert_eq!(responses[1][1]["ids"], json!(["1-2", "1-3"]));
    assert_eq!(responses[1][1]["position"], json!(1));

    assert_eq!(responses[2][1]["ids"], json!(["1-4", "1-5"]));
    assert_eq!(responses[2][1]["position"], json!(3));
    assert_eq!(responses[2][1]["total"], json!(5));

    assert_eq!(responses[3][0], json!("error"));
    assert_eq!(responses[3][1]["type"], json!("invalidArguments"));
}

#[tokio::test]
async fn email_query_filters_by_mailbox_and_text() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Quarterly report"),
        1_700_000_001,
    );
    data.lock().append(
        &["Archive"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Holiday plans"),
        1_700_000_002,
    );
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/query", {"accountId": "a", "filter": {"role": "inbox"}}, "0"],
            ["Email/query", {
                "accountId": "a",
                "#filter": {"resultOf": "0", "name": "Mailbox/query", "path": "/ids/0"}
            }, "1"],
            ["Email/query", {
                "accountId": "a",
                "filter": {"subject": "Holiday"}
            }, "2"],
        ]),
    )
    .await;

    // The wrapped back-reference result is not a filter object.
    assert_eq!(responses[1][0], json!("error"));
    assert_eq!(responses[2][1]["ids"], json!(["1-2"]));
    assert_eq!(responses[2][1]["canCalculateChanges"], json!(false));
}

#[tokio::test]
async fn email_query_in_mailbox_filter() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "One"),
        1_700_000_001,
    );
    data.lock().append(
        &["Archive"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Two"),
        1_700_000_002,
    );
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/query", {"accountId": "a", "filter": {"role": "inbox"}}, "0"],
            ["Mailbox/get", {"accountId": "a"}, "ignored"],
        ]),
    )
    .await;
    let inbox_id = responses[0][1]["ids"][0].as_str().unwrap().to_string();

    let responses = submit(
        &jmap,
        json!([["Email/query", {
            "accountId": "a",
            "filter": {"inMailbox": inbox_id}
        }, "0"]]),
    )
    .await;
    assert_eq!(responses[0][1]["ids"], json!(["1-1"]));
}

#[tokio::test]
async fn email_changes_pages_from_genesis_state() {
    let data = seeded_mail();
    for n in 1..=3u32 {
        data.lock().append(
            &["INBOX"],
            &[],
            raw_message(
                "jane@example.com",
                "mary@example.com",
                &format!("Message {n}"),
            ),
            1_700_000_000 + i64::from(n),
        );
    }
    let (jmap, _) = server(data);

    let mut since = "1,1,1".to_string();
    let mut created = Vec::new();
    for _ in 0..10 {
        let responses = submit(
            &jmap,
            json!([["Email/changes", {
                "accountId": "a",
                "sinceState": since,
                "maxChanges": 1
            }, "0"]]),
        )
        .await;
        let body = &responses[0][1];
        assert_eq!(responses[0][0], json!("Email/changes"));
        for id in body["created"].as_array().unwrap() {
            created.push(id.as_str().unwrap().to_string());
        }
        assert!(body["created"].as_array().unwrap().len() <= 1);
        let new_state = body["newState"].as_str().unwrap().to_string();
        if !body["hasMoreChanges"].as_bool().unwrap() {
            break;
        }
        assert_ne!(new_state, since, "paging must make progress");
        since = new_state;
    }
    assert_eq!(created, ["1-1", "1-2", "1-3"]);

    // Re-polling from the final state reports nothing new.
    let responses = submit(
        &jmap,
        json!([["Email/changes", {
            "accountId": "a",
            "sinceState": since,
            "maxChanges": 1
        }, "0"]]),
    )
    .await;
    // `since` still holds the state before the last page; poll once
    // more from the returned state to observe quiescence.
    let final_state = responses[0][1]["newState"].as_str().unwrap().to_string();
    let responses = submit(
        &jmap,
        json!([["Email/changes", {
            "accountId": "a",
            "sinceState": final_state,
            "maxChanges": 10
        }, "0"]]),
    )
    .await;
    let body = &responses[0][1];
    assert_eq!(body["created"], json!([]));
    assert_eq!(body["updated"], json!([]));
    assert_eq!(body["destroyed"], json!([]));
    assert_eq!(body["hasMoreChanges"], json!(false));
}

#[tokio::test]
async fn email_changes_reports_flag_updates_and_expunges() {
    let data = seeded_mail();
    for n in 1..=2u32 {
        data.lock().append(
            &["INBOX"],
            &[],
            raw_message(
                "jane@example.com",
                "mary@example.com",
                &format!("Message {n}"),
            ),
            1_700_000_000 + i64::from(n),
        );
    }
    let (jmap, _) = server(data.clone());

    let responses = submit(
        &jmap,
        json!([["Email/changes", {"accountId": "a", "sinceState": "1,1,1"}, "0"]]),
    )
    .await;
    let state = responses[0][1]["newState"].as_str().unwrap().to_string();

    data.lock().set_flags(1, &["\\Seen"]);
    data.lock().expunge(2);

    let responses = submit(
        &jmap,
        json!([["Email/changes", {"accountId": "a", "sinceState": state}, "0"]]),
    )
    .await;
    let body = &responses[0][1];
    assert_eq!(body["updated"], json!(["1-1"]));
    assert_eq!(body["destroyed"], json!(["1-2"]));
    assert_eq!(body["created"], json!([]));
}

#[tokio::test]
async fn email_changes_rejects_future_and_foreign_states() {
    let (jmap, _) = server(seeded_mail());
    let responses = submit(
        &jmap,
        json!([
            ["Email/changes", {"accountId": "a", "sinceState": "9,9,9"}, "0"],
            ["Email/changes", {"accountId": "a", "sinceState": "bogus"}, "1"],
        ]),
    )
    .await;
    assert_eq!(responses[0][0], json!("error"));
    assert_eq!(responses[0][1]["type"], json!("cannotCalculateChanges"));
    assert_eq!(responses[1][0], json!("error"));
    assert_eq!(responses[1][1]["type"], json!("invalidArguments"));
}

#[tokio::test]
async fn email_set_updates_keywords_and_mailboxes() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Flag me"),
        1_700_000_001,
    );
    let (jmap, _) = server(data.clone());

    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/query", {"accountId": "a", "filter": {"name": "Archive"}}, "0"],
            ["Mailbox/get", {"accountId": "a"}, "sync"],
        ]),
    )
    .await;
    let archive_id = responses[0][1]["ids"][0].as_str().unwrap().to_string();

    let responses = submit(
        &jmap,
        json!([["Email/set", {
            "accountId": "a",
            "update": {"1-1": {
                "keywords/$seen": true,
                "mailboxIds": {(archive_id): true}
            }}
        }, "0"]]),
    )
    .await;
    assert!(responses[0][1]["updated"]
        .as_object()
        .unwrap()
        .contains_key("1-1"));

    let locked = data.lock();
    let message = locked.messages.get(&1).unwrap();
    assert!(message.flags.iter().any(|flag| flag == "\\Seen"));
    assert_eq!(message.mailboxes, vec!["Archive".to_string()]);
}

#[tokio::test]
async fn email_set_rejects_content_edits() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Immutable"),
        1_700_000_001,
    );
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([["Email/set", {
            "accountId": "a",
            "update": {"1-1": {"subject": "New subject"}}
        }, "0"]]),
    )
    .await;
    let error = &responses[0][1]["notUpdated"]["1-1"];
    assert_eq!(error["type"], json!("invalidProperties"));
}

#[tokio::test]
async fn email_create_appends_from_blob() {
    use jmap::blob::BlobStore;

    let data = seeded_mail();
    let store = SqlStore::open_memory().expect("in-memory store");
    let jmap = JMAP::new(Config::default(), store);
    let blobs = Arc::new(jmap::blob::MemoryBlobStore::new());
    jmap.add_account(
        "a",
        Box::new(MockImapSession::new(data.clone())),
        Arc::new(MockSender::default()),
        blobs.clone(),
    );
    blobs
        .put(
            "a",
            "draft-blob",
            raw_message("jane@example.com", "mary@example.com", "Draft"),
        )
        .await
        .unwrap();

    let responses = submit(
        &jmap,
        json!([
            ["Mailbox/query", {"accountId": "a", "filter": {"role": "inbox"}}, "0"],
        ]),
    )
    .await;
    let inbox_id = responses[0][1]["ids"][0].as_str().unwrap().to_string();

    let responses = submit(
        &jmap,
        json!([["Email/set", {
            "accountId": "a",
            "create": {
                "draft": {
                    "mailboxIds": {(inbox_id.clone()): true},
                    "keywords": {"$draft": true},
                    "blobId": "draft-blob"
                },
                "broken": {
                    "mailboxIds": {(inbox_id): true},
                    "blobId": "missing"
                }
            }
        }, "0"]]),
    )
    .await;

    let created = &responses[0][1]["created"]["draft"];
    assert_eq!(created["id"], json!("1-1"));
    assert_eq!(
        responses[0][1]["notCreated"]["broken"]["type"],
        json!("blobNotFound")
    );

    let locked = data.lock();
    let message = locked.messages.get(&1).unwrap();
    assert_eq!(message.mailboxes, vec!["INBOX".to_string()]);
    assert!(message.flags.iter().any(|flag| flag == "\\Draft"));
}

#[tokio::test]
async fn thread_get_returns_surrogate_threads() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Solo"),
        1_700_000_001,
    );
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([["Thread/get", {"accountId": "a", "ids": ["1-1", "1-9"]}, "0"]]),
    )
    .await;
    let body = &responses[0][1];
    assert_eq!(body["list"][0]["id"], json!("1-1"));
    assert_eq!(body["list"][0]["emailIds"], json!(["1-1"]));
    assert_eq!(body["notFound"], json!(["1-9"]));
}

#[tokio::test]
async fn thread_changes_tracks_new_messages() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Solo"),
        1_700_000_001,
    );
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([["Thread/changes", {
            "accountId": "a",
            "sinceState": "1,1,1"
        }, "0"]]),
    )
    .await;
    // A successful response echoes the request's method name.
    assert_eq!(responses[0][0], json!("Thread/changes"));
    assert_eq!(responses[0][2], json!("0"));
    let body = &responses[0][1];
    assert_eq!(body["created"], json!(["1-1"]));
    assert_eq!(body["destroyed"], json!([]));
    assert_eq!(body["hasMoreChanges"], json!(false));
}

#[tokio::test]
async fn identity_email_is_immutable() {
    let (jmap, _) = server(seeded_mail());

    let responses = submit(
        &jmap,
        json!([
            ["Identity/set", {
                "accountId": "a",
                "create": {"me": {"name": "Jane Doe", "email": "jane@example.com"}}
            }, "0"],
            ["Identity/set", {
                "accountId": "a",
                "update": {"#me": {"email": "other@example.com"}}
            }, "1"],
            ["Identity/set", {
                "accountId": "a",
                "update": {"#me": {"name": "Jane"}}
            }, "2"],
        ]),
    )
    .await;

    let id = responses[0][1]["created"]["me"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let error = &responses[1][1]["notUpdated"]["#me"];
    assert_eq!(error["type"], json!("invalidPatch"));
    assert_eq!(error["properties"], json!(["email"]));
    assert!(responses[2][1]["updated"]
        .as_object()
        .unwrap()
        .contains_key(&id));

    let responses = submit(
        &jmap,
        json!([["Identity/get", {"accountId": "a"}, "0"]]),
    )
    .await;
    let identity = &responses[0][1]["list"][0];
    assert_eq!(identity["name"], json!("Jane"));
    assert_eq!(identity["email"], json!("jane@example.com"));
}

#[tokio::test]
async fn identity_create_requires_valid_email() {
    let (jmap, _) = server(seeded_mail());
    let responses = submit(
        &jmap,
        json!([["Identity/set", {
            "accountId": "a",
            "create": {"bad": {"name": "No address", "email": "not-an-address"}}
        }, "0"]]),
    )
    .await;
    assert_eq!(
        responses[0][1]["notCreated"]["bad"]["type"],
        json!("invalidProperties")
    );
}

#[tokio::test]
async fn submission_sends_and_splices_follow_on_destroy() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &["\\Draft"],
        raw_message("jane@example.com", "mary@example.com", "Outbound"),
        1_700_000_001,
    );
    let (jmap, sender) = server(data.clone());

    let responses = submit(
        &jmap,
        json!([
            ["Identity/set", {
                "accountId": "a",
                "create": {"me": {"name": "Jane", "email": "jane@example.com"}}
            }, "0"],
            ["EmailSubmission/set", {
                "accountId": "a",
                "create": {"sub": {"identityId": "#me", "emailId": "1-1"}},
                "onSuccessDestroyEmail": ["#sub"]
            }, "1"],
        ]),
    )
    .await;

    // The submission result is followed by an implicit Email/set
    // sharing the same client tag.
    assert_eq!(responses[1][0], json!("EmailSubmission/set"));
    assert_eq!(responses[1][2], json!("1"));
    assert_eq!(responses[2][0], json!("Email/set"));
    assert_eq!(responses[2][2], json!("1"));
    assert_eq!(responses[2][1]["destroyed"], json!(["1-1"]));

    let created = &responses[1][1]["created"]["sub"];
    assert_eq!(created["undoStatus"], json!("final"));

    let sent = sender.sent.lock();
    assert_eq!(sent.len(), 1);
    let envelope: &Envelope = &sent[0].0;
    assert_eq!(envelope.mail_from.email, "jane@example.com");
    assert_eq!(envelope.rcpt_to.len(), 1);
    assert_eq!(envelope.rcpt_to[0].email, "mary@example.com");
    assert!(data.lock().messages.is_empty());
}

#[tokio::test]
async fn submission_cannot_be_unsent() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Sent"),
        1_700_000_001,
    );
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([
            ["Identity/set", {
                "accountId": "a",
                "create": {"me": {"email": "jane@example.com"}}
            }, "0"],
            ["EmailSubmission/set", {
                "accountId": "a",
                "create": {"sub": {"identityId": "#me", "emailId": "1-1"}}
            }, "1"],
            ["EmailSubmission/set", {
                "accountId": "a",
                "update": {"#sub": {"undoStatus": "canceled"}}
            }, "2"],
        ]),
    )
    .await;

    assert_eq!(
        responses[2][1]["notUpdated"]["#sub"]["type"],
        json!("cannotUnsend")
    );
}

#[tokio::test]
async fn submission_query_filters_by_undo_status() {
    let data = seeded_mail();
    data.lock().append(
        &["INBOX"],
        &[],
        raw_message("jane@example.com", "mary@example.com", "Sent"),
        1_700_000_001,
    );
    let (jmap, _) = server(data);

    let responses = submit(
        &jmap,
        json!([
            ["Identity/set", {
                "accountId": "a",
                "create": {"me": {"email": "jane@example.com"}}
            }, "0"],
            ["EmailSubmission/set", {
                "accountId": "a",
                "create": {"sub": {"identityId": "#me", "emailId": "1-1"}}
            }, "1"],
            ["EmailSubmission/query", {
                "accountId": "a",
                "filter": {"undoStatus": "final"},
                "calculateTotal": true
            }, "2"],
            ["EmailSubmission/query", {
                "accountId": "a",
                "filter": {"undoStatus": "pending"}
            }, "3"],
        ]),
    )
    .await;

    let sub_id = responses[1][1]["created"]["sub"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(responses[2][1]["ids"], json!([sub_id]));
    assert_eq!(responses[2][1]["total"], json!(1));
    assert_eq!(responses[3][1]["ids"], json!([]));
}

#[tokio::test]
async fn vacation_response_is_a_singleton() {
    let (jmap, _) = server(seeded_mail());

    let responses = submit(
        &jmap,
        json!([
            ["VacationResponse/get", {"accountId": "a"}, "0"],
            ["VacationResponse/set", {
                "accountId": "a",
                "create": {"extra": {"isEnabled": true}}
            }, "1"],
            ["VacationResponse/set", {
                "accountId": "a",
                "update": {"singleton": {
                    "isEnabled": true,
                    "subject": "Out of office"
                }}
            }, "2"],
            ["VacationResponse/get", {"accountId": "a", "ids": ["singleton"]}, "3"],
            ["VacationResponse/set", {
                "accountId": "a",
                "destroy": ["singleton"]
            }, "4"],
        ]),
    )
    .await;

    let initial = &responses[0][1]["list"][0];
    assert_eq!(initial["id"], json!("singleton"));
    assert_eq!(initial["isEnabled"], json!(false));

    assert_eq!(
        responses[1][1]["notCreated"]["extra"]["type"],
        json!("singleton")
    );
    assert!(responses[2][1]["updated"]
        .as_object()
        .unwrap()
        .contains_key("singleton"));
    let updated = &responses[3][1]["list"][0];
    assert_eq!(updated["isEnabled"], json!(true));
    assert_eq!(updated["subject"], json!("Out of office"));
    assert_eq!(
        responses[4][1]["notDestroyed"]["singleton"]["type"],
        json!("singleton")
    );
}

#[tokio::test]
async fn query_changes_is_always_declined() {
    let (jmap, _) = server(seeded_mail());
    let responses = submit(
        &jmap,
        json!([["Mailbox/queryChanges", {
            "accountId": "a",
            "sinceQueryState": "0"
        }, "0"]]),
    )
    .await;
    assert_eq!(responses[0][0], json!("error"));
    assert_eq!(responses[0][1]["type"], json!("cannotCalculateChanges"));
}

#[tokio::test]
async fn unknown_method_and_echo() {
    let (jmap, _) = server(seeded_mail());
    let responses = submit(
        &jmap,
        json!([
            ["Core/echo", {"hello": [1, 2, 3]}, "0"],
            ["Email/steal", {}, "1"],
        ]),
    )
    .await;
    assert_eq!(responses[0][0], json!("Core/echo"));
    assert_eq!(responses[0][1], json!({"hello": [1, 2, 3]}));
    assert_eq!(responses[1][0], json!("error"));
    assert_eq!(responses[1][1]["type"], json!("unknownMethod"));
}

#[tokio::test]
async fn http_rejects_wrong_content_type() {
    let (jmap, _) = server(seeded_mail());
    let response = jmap
        .handle_http("POST", "/jmap", Some("text/plain"), b"{}")
        .await;
    assert_eq!(response.status, 400);
    let response = jmap
        .handle_http("POST", "/nowhere", Some("application/json"), b"{}")
        .await;
    assert_eq!(response.status, 404);
}
