//! Key-value engine: paginated listing with ownership filtering.

mod common;

use common::{admin, engine, kv_contract, open_post_contract, post_some, success};
use declarative_crud::domain::contract::{AuthInput, HttpMethod};
use serde_json::json;

#[tokio::test]
async fn privileged_callers_list_everything() {
    let (_registry, engine) = engine();
    post_some(&engine, "userA", 5).await;
    let get = engine.validated(kv_contract(HttpMethod::Get));

    let page = success(get.handle(json!({}), admin()).await.unwrap());
    assert_eq!(page.result.as_array().unwrap().len(), 5);
    assert_eq!(page.more, Some(false));
    assert_eq!(page.cursor, None);
}

#[tokio::test]
async fn plain_callers_list_only_their_own_records() {
    let (_registry, engine) = engine();
    post_some(&engine, "userA", 5).await;
    post_some(&engine, "userB", 3).await;
    let get = engine.validated(kv_contract(HttpMethod::Get));

    let page = success(get.handle(json!({}), AuthInput::user("userA")).await.unwrap());
    let records = page.result.as_array().unwrap().clone();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r["createdBy"] == json!("userA")));

    // Anonymous callers own nothing and see nothing.
    let page = success(get.handle(json!({}), AuthInput::anonymous()).await.unwrap());
    assert_eq!(page.result, json!([]));
}

#[tokio::test]
async fn limit_bounds_a_page_and_flags_more() {
    let (_registry, engine) = engine();
    post_some(&engine, "userA", 30).await;
    let get = engine.validated(kv_contract(HttpMethod::Get));

    let page = success(get.handle(json!({ "limit": 10 }), admin()).await.unwrap());
    assert_eq!(page.result.as_array().unwrap().len(), 10);
    assert_eq!(page.more, Some(true));
}

#[tokio::test]
async fn cursor_resumes_a_filtered_listing_to_completion() {
    let (_registry, engine) = engine();
    let post = engine.validated(open_post_contract());
    // Interleave two owners so a single key page holds records the plain
    // caller is not allowed to fetch.
    for i in 0..10 {
        for sub in ["userA", "userB"] {
            let result = post
                .handle(
                    json!({ "id": format!("my_id_{}{}", sub, i), "name": "cat" }),
                    AuthInput::user(sub),
                )
                .await
                .unwrap();
            assert!(!result.is_error(), "seed post failed: {:?}", result);
        }
    }

    let get = engine.validated(kv_contract(HttpMethod::Get));
    let mut collected = Vec::new();
    let mut cursor: Option<String> = None;
    let mut rounds = 0;
    loop {
        let mut input = json!({ "limit": 10 });
        if let Some(cursor) = &cursor {
            input["cursor"] = json!(cursor);
        }
        let page = success(get.handle(input, AuthInput::user("userA")).await.unwrap());
        collected.extend(page.result.as_array().unwrap().clone());
        rounds += 1;
        assert!(rounds <= 4, "listing did not terminate");
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(collected.len(), 10);
    assert!(collected.iter().all(|r| r["createdBy"] == json!("userA")));
    assert!(rounds > 1, "expected the listing to need more than one page");
}

#[tokio::test]
async fn listing_skips_records_without_an_owner_stamp_for_plain_callers() {
    let (_registry, engine) = engine();
    post_some(&engine, "userA", 2).await;
    let get = engine.validated(kv_contract(HttpMethod::Get));

    // A different subject matches neither stamp; empty page, listing done.
    let page = success(get.handle(json!({}), AuthInput::user("userC")).await.unwrap());
    assert_eq!(page.result, json!([]));
    assert_eq!(page.more, Some(false));

    // A malformed limit falls back to the default instead of erroring.
    let page = get.handle(json!({ "limit": "ten" }), admin()).await.unwrap();
    assert!(!page.is_error(), "string limit should not fail the call");
}
