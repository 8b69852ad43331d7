use super::*;
use snowdash_reporter::config::SessionStrategy;
use snowdash_reporter::run_pipeline;
use snowdash_reporter::submission_log::read_entries;
use snowdash_reporter::utils::error::AuthError;
use snowdash_reporter::AppError;

#[tokio::test]
async fn test_every_store_yields_one_entry() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let config = get_test_config(stores(3), &server.uri(), &output);
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    let entries = read_entries(&log_path)?;
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.run_id == report.run_id && e.success));
    assert_eq!(report.summary.succeeded + report.summary.failed, 3);
    assert_eq!(report.session_acquisitions, 1);
    assert_eq!(site.logins(), 1);

    let record = entries[0].record.as_ref().expect("success entry carries its record");
    assert_eq!(record.shoppers.len(), 2);
    assert_eq!(record.inventory[0].sku, "SKU-MILK");
    assert_eq!(record.inventory[0].image_url, "https://m.media-amazon.com/images/I/milk._SS300_.jpg");

    let store_posts = posted_texts(&server, "/store").await;
    assert_eq!(store_posts.len(), 3);
    assert!(store_posts[0].starts_with("*Store 1*"));
    assert!(store_posts[2].starts_with("*Store 3*"));
    let summary_posts = posted_texts(&server, "/summary").await;
    assert_eq!(summary_posts.len(), 1);
    assert!(summary_posts[0].contains("Stores processed: 3 (3 succeeded, 0 failed)"));
    Ok(())
}

#[tokio::test]
async fn test_transient_failures_then_success() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_faults("A2", &[Fault::Timeout, Fault::Timeout]));
    let mut config = get_test_config(stores(3), &server.uri(), &output);
    config.retry.max_attempts = 3;
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    let entries = read_entries(&log_path)?;
    assert_eq!(entries.len(), 3);
    assert!(entries[1].success);
    assert_eq!(entries[1].attempts, 3);
    assert_eq!(site.scrape_attempts("A2"), 3);
    assert_eq!(report.summary.succeeded, 3);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.notifications_sent, 4);

    assert_eq!(posted_texts(&server, "/store").await.len(), 3);
    assert_eq!(posted_texts(&server, "/summary").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_attempts_become_failure() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_faults("A1", &[Fault::Timeout; 5]));
    let config = get_test_config(stores(2), &server.uri(), &output);
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    assert_eq!(site.scrape_attempts("A1"), 3);
    let entries = read_entries(&log_path)?;
    assert!(!entries[0].success);
    assert_eq!(entries[0].attempts, 3);
    assert_eq!(entries[0].failure_kind.as_deref(), Some("timeout"));
    assert!(entries[1].success);

    assert_eq!(report.summary.failed, 1);
    let summary = &posted_texts(&server, "/summary").await[0];
    assert!(summary.contains("*Failed stores:* Amazon Fresh - Store 1"));
    Ok(())
}

#[tokio::test]
async fn test_layout_change_is_not_retried() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_faults("A1", &[Fault::Layout]));
    let config = get_test_config(stores(1), &server.uri(), &output);
    let log_path = config.output.submissions_path();

    run_pipeline(&create_context(config, &site)?).await?;

    assert_eq!(site.scrape_attempts("A1"), 1);
    let entries = read_entries(&log_path)?;
    assert_eq!(entries[0].attempts, 1);
    assert_eq!(entries[0].failure_kind.as_deref(), Some("unexpected_layout"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_credentials_abort_before_any_store() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_password("something else"));
    let config = get_test_config(stores(3), &server.uri(), &output);
    let log_path = config.output.submissions_path();

    let result = run_pipeline(&create_context(config, &site)?).await;

    assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidCredentials(_)))));
    assert_eq!(site.login_starts(), 1);
    assert_eq!(site.dashboard_visits(), 0);
    assert!(read_entries(&log_path)?.is_empty());
    assert!(posted_texts(&server, "/store").await.is_empty());

    let summary_posts = posted_texts(&server, "/summary").await;
    assert_eq!(summary_posts.len(), 1);
    assert!(summary_posts[0].contains("Run aborted before any store was processed."));
    Ok(())
}

#[tokio::test]
async fn test_session_expiry_triggers_one_relogin() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_faults("A2", &[Fault::Expire]));
    let config = get_test_config(stores(3), &server.uri(), &output);
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    assert_eq!(report.session_acquisitions, 2);
    assert_eq!(site.logins(), 2);
    assert_eq!(site.scrape_attempts("A2"), 2);

    let entries = read_entries(&log_path)?;
    assert!(entries.iter().all(|e| e.success));
    assert_eq!(entries[1].attempts, 2);
    Ok(())
}

#[tokio::test]
async fn test_expiry_on_last_attempt_logs_in_for_next_store() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_faults("A1", &[Fault::Expire]));
    let mut config = get_test_config(stores(3), &server.uri(), &output);
    config.retry.max_attempts = 1;
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    let entries = read_entries(&log_path)?;
    assert!(!entries[0].success);
    assert_eq!(entries[0].failure_kind.as_deref(), Some("session_expired"));
    assert!(entries[1].success);
    assert!(entries[2].success);
    assert_eq!(site.logins(), 2);
    assert_eq!(site.scrape_attempts("A2"), 1);
    assert_eq!(report.session_acquisitions, 2);
    Ok(())
}

#[tokio::test]
async fn test_next_run_reuses_saved_session() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let config = get_test_config(stores(2), &server.uri(), &output);

    let first = run_pipeline(&create_context(config.clone(), &site)?).await?;
    let second = run_pipeline(&create_context(config, &site)?).await?;

    assert_eq!(first.session_acquisitions, 1);
    assert_eq!(second.session_acquisitions, 0);
    assert_eq!(second.summary.succeeded, 2);
    assert_eq!(site.login_starts(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_relogin_fails_remaining_stores() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_max_logins(1).with_faults("A1", &[Fault::Expire]));
    let config = get_test_config(stores(3), &server.uri(), &output);
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    let entries = read_entries(&log_path)?;
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| !e.success));
    assert!(entries
        .iter()
        .all(|e| e.failure_kind.as_deref() == Some("reauthentication_failed")));
    assert_eq!(entries[0].attempts, 1);
    assert_eq!(entries[1].attempts, 0);
    assert_eq!(entries[2].attempts, 0);
    assert_eq!(site.scrape_attempts("A2"), 0);

    assert_eq!(report.summary.failed, 3);
    assert_eq!(posted_texts(&server, "/store").await.len(), 3);
    assert_eq!(posted_texts(&server, "/summary").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_per_store_strategy_logs_in_for_each_store() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let mut config = get_test_config(stores(3), &server.uri(), &output);
    config.retry.session_strategy = SessionStrategy::PerStore;

    let report = run_pipeline(&create_context(config, &site)?).await?;

    assert_eq!(site.logins(), 3);
    assert_eq!(report.session_acquisitions, 3);
    assert_eq!(report.summary.succeeded, 3);
    Ok(())
}

#[tokio::test]
async fn test_store_timeout_moves_on() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_faults("A1", &[Fault::Hang]));
    let mut config = get_test_config(stores(2), &server.uri(), &output);
    config.retry.store_timeout_secs = 1;
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    let entries = read_entries(&log_path)?;
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].success);
    assert_eq!(entries[0].failure_kind.as_deref(), Some("timeout"));
    assert_eq!(entries[0].attempts, 1);
    assert!(entries[1].success);
    assert_eq!(report.summary.failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_zero_stores_still_report() -> anyhow::Result<()> {
    let server = start_chat_server().await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let config = get_test_config(Vec::new(), &server.uri(), &output);

    let report = run_pipeline(&create_context(config, &site)?).await?;

    assert_eq!(report.summary.total, 0);
    assert_eq!(site.login_starts(), 0);
    assert!(posted_texts(&server, "/store").await.is_empty());

    let summary_posts = posted_texts(&server, "/summary").await;
    assert_eq!(summary_posts.len(), 1);
    assert!(summary_posts[0].contains("Stores processed: 0 (0 succeeded, 0 failed)"));
    Ok(())
}

#[tokio::test]
async fn test_chat_outage_does_not_fail_run() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let config = get_test_config(stores(2), &server.uri(), &output);
    let log_path = config.output.submissions_path();

    let report = run_pipeline(&create_context(config, &site)?).await?;

    assert_eq!(read_entries(&log_path)?.len(), 2);
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(report.notifications_failed, 3);
    // one retry per message
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 6);
    Ok(())
}
