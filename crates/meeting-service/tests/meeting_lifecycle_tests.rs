//! Meeting lifecycle integration tests.
//!
//! Drives the HTTP surface and the call event consumer of a memory-backed
//! `TestMeetingServer`.

use meeting_service::models::{ChatCloseInfo, SATISFACTION_VARIABLE};
use meeting_service::repositories::MeetingStore;
use meeting_service::services::call_client::mock::MockCallVariables;
use meeting_service::tasks::expiry_sweep::run_sweep;
use meeting_test_utils::{hangup_payload, test_cipher, TestMeetingServer};
use std::time::Duration;

async fn create_meeting(
    server: &TestMeetingServer,
    body: serde_json::Value,
) -> Result<serde_json::Value, anyhow::Error> {
    let response = reqwest::Client::new()
        .post(format!("{}/v1/meetings", server.url()))
        .json(&body)
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    Ok(response.json().await?)
}

async fn get_meeting(
    server: &TestMeetingServer,
    token: &str,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::get(format!("{}/v1/meetings/{}", server.url(), token)).await?)
}

async fn submit_satisfaction(
    server: &TestMeetingServer,
    token: &str,
    value: &str,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::Client::new()
        .post(format!("{}/v1/meetings/{}/satisfaction", server.url(), token))
        .json(&serde_json::json!({ "satisfaction": value }))
        .send()
        .await?)
}

/// Poll until the consumer has attached a call to the meeting.
async fn wait_for_call(server: &TestMeetingServer, token: &str) -> Result<(), anyhow::Error> {
    for _ in 0..50 {
        let view = server.service().get_meeting(token).await?;
        if view.is_some_and(|view| view.call_id.is_some()) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("call was never linked to the meeting")
}

fn token_of(created: &serde_json::Value) -> String {
    created["id"].as_str().unwrap_or_default().to_string()
}

/// Full lifecycle: create, redeem, call bridged, survey answered once.
#[tokio::test]
async fn test_meeting_lifecycle_end_to_end() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn().await?;

    let created = create_meeting(
        &server,
        serde_json::json!({
            "domain_id": 1,
            "title": "title",
            "expire_sec": 3600,
            "base_path": "https://x/m",
            "variables": {"k": "v"},
        }),
    )
    .await?;
    let token = token_of(&created);
    assert_eq!(created["url"], format!("https://x/m/{token}"));

    let view: serde_json::Value = get_meeting(&server, &token).await?.json().await?;
    assert_eq!(view["title"], "title");
    assert_eq!(view["variables"]["k"], "v");
    assert_eq!(view["allow_satisfaction"], false);

    // The call engine references the meeting by its internal id.
    let id = test_cipher().redeem(&token)?;
    server
        .publish_call_event(hangup_payload("call-1", &id, 1_704_067_260_000))
        .await?;
    wait_for_call(&server, &token).await?;

    let view: serde_json::Value = get_meeting(&server, &token).await?.json().await?;
    assert_eq!(view["call_id"], "call-1");
    assert_eq!(view["bridged"], true);
    assert_eq!(view["allow_satisfaction"], true);

    let response = submit_satisfaction(&server, &token, "5").await?;
    assert_eq!(response.status(), 204);

    let view: serde_json::Value = get_meeting(&server, &token).await?.json().await?;
    assert_eq!(view["satisfaction"], "5");
    assert_eq!(view["allow_satisfaction"], false);

    let response = submit_satisfaction(&server, &token, "4").await?;
    assert_eq!(response.status(), 403);

    let pushed = server.calls().recorded();
    let [push] = pushed.as_slice() else {
        anyhow::bail!("expected exactly one call engine push, got {}", pushed.len());
    };
    assert_eq!(push.domain_id, 1);
    assert_eq!(push.call_id, "call-1");
    assert_eq!(
        push.variables.get(SATISFACTION_VARIABLE).map(String::as_str),
        Some("5")
    );

    Ok(())
}

/// Test that a non-positive TTL falls back to 24 hours.
#[tokio::test]
async fn test_default_ttl_applied() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn().await?;

    for ttl in [0, -30] {
        let created = create_meeting(
            &server,
            serde_json::json!({
                "domain_id": 1,
                "title": "daily",
                "expire_sec": ttl,
                "base_path": "https://x/m",
            }),
        )
        .await?;

        let view: serde_json::Value = get_meeting(&server, &token_of(&created)).await?.json().await?;
        let lifetime = view["expires_at"].as_i64().unwrap_or_default()
            - view["created_at"].as_i64().unwrap_or_default();
        assert_eq!(lifetime, 86_400, "ttl {ttl}");
    }

    Ok(())
}

/// Test the grace rule: a meeting with a call outlives its nominal expiry.
#[tokio::test]
async fn test_expiry_and_call_grace() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn().await?;
    let body = serde_json::json!({
        "domain_id": 2,
        "title": "short",
        "expire_sec": 60,
        "base_path": "https://x/m",
    });

    let idle = token_of(&create_meeting(&server, body.clone()).await?);
    let called = token_of(&create_meeting(&server, body).await?);

    server
        .service()
        .close_by_call(&called, "call-7", true)
        .await?;

    server.clock().advance(61);

    assert_eq!(get_meeting(&server, &idle).await?.status(), 404);
    assert_eq!(get_meeting(&server, &called).await?.status(), 200);

    // The sweep removes everything past expiry, calls included.
    let store = server.service().store();
    let swept = run_sweep(store.as_ref(), server.clock().now()).await;
    assert_eq!(swept, 1);
    assert_eq!(get_meeting(&server, &called).await?.status(), 404);

    Ok(())
}

/// Test that satisfaction before a bridged call is rejected.
#[tokio::test]
async fn test_satisfaction_requires_bridged_call() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn().await?;
    let body = serde_json::json!({
        "domain_id": 3,
        "title": "survey",
        "expire_sec": 600,
        "base_path": "https://x/m",
    });

    let token = token_of(&create_meeting(&server, body.clone()).await?);
    assert_eq!(submit_satisfaction(&server, &token, "5").await?.status(), 403);

    // A call that never connected does not open the survey either.
    let unbridged = token_of(&create_meeting(&server, body).await?);
    server
        .publish_call_event(hangup_payload("call-2", &unbridged, 0))
        .await?;
    wait_for_call(&server, &unbridged).await?;
    assert_eq!(
        submit_satisfaction(&server, &unbridged, "5").await?.status(),
        403
    );
    assert_eq!(server.calls().call_count(), 0);

    Ok(())
}

/// Test that a failed call engine push leaves the meeting unchanged.
#[tokio::test]
async fn test_failed_push_skips_store_write() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn_with_calls(MockCallVariables::failing()).await?;

    let token = token_of(
        &create_meeting(
            &server,
            serde_json::json!({
                "domain_id": 3,
                "title": "survey",
                "expire_sec": 600,
                "base_path": "https://x/m",
            }),
        )
        .await?,
    );
    server.service().close_by_call(&token, "call-3", true).await?;

    let response = submit_satisfaction(&server, &token, "2").await?;
    assert_eq!(response.status(), 503);

    let view: serde_json::Value = get_meeting(&server, &token).await?.json().await?;
    assert!(view.get("satisfaction").is_none());
    assert_eq!(view["allow_satisfaction"], true);

    Ok(())
}

/// Test that a finished call closes the linked chat once.
#[tokio::test]
async fn test_call_closes_linked_chat() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn().await?;
    let token = token_of(
        &create_meeting(
            &server,
            serde_json::json!({
                "domain_id": 9,
                "title": "chat",
                "expire_sec": 600,
                "base_path": "https://x/m",
            }),
        )
        .await?,
    );
    let id = test_cipher().redeem(&token)?;

    let chat = ChatCloseInfo {
        conversation_id: "conv-1".to_string(),
        closer_id: "channel-1".to_string(),
        auth_user_id: 42,
    };
    server
        .memory_store()
        .ok_or_else(|| anyhow::anyhow!("memory-backed server expected"))?
        .link_chat(&id, chat.clone())
        .await;

    let payload = hangup_payload("call-1", &token, 1);
    server.publish_call_event(payload.clone()).await?;
    wait_for_call(&server, &token).await?;

    // Redelivery is a no-op.
    server.publish_call_event(payload).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(server.chat().closed(), vec![chat]);

    let store = server.service().store();
    assert!(store.get_chat_close_info(&id).await?.is_some());

    Ok(())
}

/// Test that deleted meetings are gone and deletes are not repeatable.
#[tokio::test]
async fn test_delete_meeting() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn().await?;
    let client = reqwest::Client::new();
    let token = token_of(
        &create_meeting(
            &server,
            serde_json::json!({
                "domain_id": 1,
                "title": "gone soon",
                "expire_sec": 600,
                "base_path": "https://x/m",
            }),
        )
        .await?,
    );
    let url = format!("{}/v1/meetings/{}", server.url(), token);

    assert_eq!(client.delete(&url).send().await?.status(), 204);
    assert_eq!(client.get(&url).send().await?.status(), 404);
    assert_eq!(client.delete(&url).send().await?.status(), 404);

    Ok(())
}

/// Test that tampered and garbage tokens get the same 401 body.
#[tokio::test]
async fn test_invalid_tokens_are_indistinguishable() -> Result<(), anyhow::Error> {
    let server = TestMeetingServer::spawn().await?;
    let token = token_of(
        &create_meeting(
            &server,
            serde_json::json!({
                "domain_id": 1,
                "title": "t",
                "expire_sec": 600,
                "base_path": "https://x/m",
            }),
        )
        .await?,
    );

    // Swap the last character: still base64, no longer authentic.
    let mut tampered = token.clone();
    let last = tampered.pop().unwrap_or('A');
    tampered.push(if last == 'Q' { 'g' } else { 'Q' });

    let malformed = get_meeting(&server, "not*base64").await?;
    let too_short = get_meeting(&server, "AAAA").await?;
    let forged = get_meeting(&server, &tampered).await?;

    assert_eq!(malformed.status(), 401);
    assert_eq!(too_short.status(), 401);
    assert_eq!(forged.status(), 401);

    let malformed: serde_json::Value = malformed.json().await?;
    let too_short: serde_json::Value = too_short.json().await?;
    let forged: serde_json::Value = forged.json().await?;
    assert_eq!(malformed, too_short);
    assert_eq!(too_short, forged);
    assert_eq!(forged["error"]["code"], "INVALID_TOKEN");

    Ok(())
}
