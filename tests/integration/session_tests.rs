use super::*;
use chrono::{DateTime, TimeZone, Utc};
use snowdash_reporter::config::AppConfig;
use snowdash_reporter::session::{
    Credentials, OtpGenerator, SavedSession, SessionController, SessionSettings, SessionState,
};
use snowdash_reporter::utils::error::AuthError;

const CHALLENGE_TIME: i64 = 1_111_111_109;

fn fixed_clock() -> DateTime<Utc> {
    Utc.timestamp_opt(CHALLENGE_TIME, 0).unwrap()
}

fn controller(site: &Arc<FakeSite>, output: &TempDir) -> SessionController {
    controller_for(site, &get_test_config(stores(1), "http://127.0.0.1:9", output))
}

fn controller_for(site: &Arc<FakeSite>, config: &AppConfig) -> SessionController {
    let driver: Arc<dyn BrowserDriver> = site.clone();
    SessionController::new(
        driver,
        Credentials::from_config(&config.auth),
        SessionSettings::from_config(config),
    )
    .with_clock(fixed_clock)
}

fn code_at(unix_secs: i64) -> String {
    OtpGenerator::new(OTP_SECRET).unwrap().code_at(unix_secs as u64)
}

#[tokio::test]
async fn test_login_without_challenge() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let mut controller = controller(&site, &output);

    let session_id = controller.acquire().await?.id();

    assert!(matches!(controller.state(), SessionState::Authenticated(_)));
    assert_eq!(controller.acquisitions(), 1);
    // A valid session is reused
    assert_eq!(controller.acquire().await?.id(), session_id);
    assert_eq!(site.logins(), 1);
    Ok(())
}

#[tokio::test]
async fn test_otp_accepted_in_current_window() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    // RFC 6238 SHA-1 vector for this instant
    assert_eq!(code_at(CHALLENGE_TIME), "081804");
    let site = Arc::new(FakeSite::new().with_otp(vec!["081804".to_string()]));
    let mut controller = controller(&site, &output);

    controller.acquire().await?;

    assert_eq!(site.otp_submissions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_otp_accepted_in_previous_window() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let previous = code_at(CHALLENGE_TIME - 30);
    let site = Arc::new(FakeSite::new().with_otp(vec![previous]));
    let mut controller = controller(&site, &output);

    controller.acquire().await?;

    assert_eq!(site.otp_submissions(), 2);
    assert!(controller.current().is_some());
    Ok(())
}

#[tokio::test]
async fn test_otp_rejected_in_every_window() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_otp(vec!["000000".to_string()]));
    let mut controller = controller(&site, &output);

    let err = controller.acquire().await.unwrap_err();

    assert_eq!(err, AuthError::OtpRejected { windows: 3 });
    assert!(err.is_terminal());
    assert_eq!(site.otp_submissions(), 3);
    assert!(matches!(controller.state(), SessionState::Unauthenticated));
    Ok(())
}

#[tokio::test]
async fn test_wrong_password_is_invalid_credentials() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_password("not this one"));
    let mut controller = controller(&site, &output);

    let err = controller.acquire().await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials(_)));
    assert_eq!(site.logins(), 0);
    Ok(())
}

#[tokio::test]
async fn test_reacquire_logs_in_again() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let mut controller = controller(&site, &output);

    let first = controller.acquire().await?.id();
    let second = controller.reacquire().await?.id();

    assert_ne!(first, second);
    assert_eq!(controller.acquisitions(), 2);
    assert_eq!(site.logins(), 2);

    controller.close().await;
    assert!(controller.current().is_none());
    Ok(())
}

#[tokio::test]
async fn test_saved_session_skips_login() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new().with_otp(vec![code_at(CHALLENGE_TIME)]));
    controller(&site, &output).acquire().await?;
    assert!(output.path().join("state.json").exists());

    let mut next_run = controller(&site, &output);
    next_run.acquire().await?;

    assert!(matches!(next_run.state(), SessionState::Authenticated(_)));
    assert_eq!(next_run.acquisitions(), 0);
    assert_eq!(site.login_starts(), 1);
    assert_eq!(site.otp_submissions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rejected_saved_session_falls_back_to_login() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    controller(&site, &output).acquire().await?;
    site.expire_sessions();

    let mut next_run = controller(&site, &output);
    next_run.acquire().await?;

    assert_eq!(next_run.acquisitions(), 1);
    assert_eq!(site.logins(), 2);
    let saved = SavedSession::load(&output.path().join("state.json")).await?.unwrap();
    assert_eq!(saved.cookies[0].value, "token-2");
    Ok(())
}

#[tokio::test]
async fn test_unreadable_saved_session_is_ignored() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    std::fs::write(output.path().join("state.json"), "not json")?;
    let site = Arc::new(FakeSite::new());
    let mut controller = controller(&site, &output);

    controller.acquire().await?;

    assert_eq!(site.logins(), 1);
    assert!(SavedSession::load(&output.path().join("state.json")).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_saved_session_disabled() -> anyhow::Result<()> {
    let output = TempDir::new()?;
    let site = Arc::new(FakeSite::new());
    let mut config = get_test_config(stores(1), "http://127.0.0.1:9", &output);
    config.auth.reuse_saved_session = false;

    controller_for(&site, &config).acquire().await?;
    controller_for(&site, &config).acquire().await?;

    assert_eq!(site.logins(), 2);
    assert!(!output.path().join("state.json").exists());
    Ok(())
}
