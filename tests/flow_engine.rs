//! End-to-end flow engine behavior over the in-memory backends.

use std::sync::Arc;

use anyhow::Result;
use vestibule::flow::repo::AccountRepository;
use vestibule::flow::{
    Account, AccountStatus, ConsumeOutcome, ConsumeRequest, FlowConfig, FlowEngine, FlowVariant,
    IssueOutcome, IssueRequest, Purpose, RedirectContext,
    memory::{MemoryAccountRepository, MemoryArtifactRepository},
    outcome::EmailRequest,
};

fn engine() -> (Arc<MemoryAccountRepository>, FlowEngine) {
    let accounts = Arc::new(MemoryAccountRepository::new());
    let artifacts = Arc::new(MemoryArtifactRepository::new());
    let config = FlowConfig::new("https://profile.example.com".to_string());
    let engine = FlowEngine::new(accounts.clone(), artifacts, config);
    (accounts, engine)
}

fn issue_request(email: &str, purpose: Purpose) -> IssueRequest {
    IssueRequest {
        email: email.to_string(),
        purpose,
        variant: FlowVariant::Okta,
        entry: RedirectContext::default(),
        app_client_id: None,
        from_uri: None,
        location: None,
        location_state: None,
    }
}

fn consume_request(email: &str, purpose: Purpose, secret: &str) -> ConsumeRequest {
    ConsumeRequest {
        email: email.to_string(),
        purpose,
        secret: secret.to_string(),
        link: RedirectContext::default(),
    }
}

fn dispatched_email(outcome: IssueOutcome) -> EmailRequest {
    match outcome {
        IssueOutcome::Dispatched { email, .. } => email,
        other => panic!("expected dispatch, got {other:?}"),
    }
}

fn code_from(email: &EmailRequest) -> String {
    email.payload["code"]
        .as_str()
        .expect("payload carries a code")
        .to_string()
}

fn token_from(email: &EmailRequest) -> String {
    let link = email.payload["link"].as_str().expect("payload carries a link");
    let path = link.split('?').next().expect("link path");
    path.rsplit('/').next().expect("token segment").to_string()
}

#[tokio::test]
async fn reissue_supersedes_previous_code() -> Result<()> {
    let (_, engine) = engine();
    let email = "super@example.com";

    let first = dispatched_email(engine.issue(issue_request(email, Purpose::Register)).await?);
    let second = dispatched_email(engine.issue(issue_request(email, Purpose::Register)).await?);
    let old_code = code_from(&first);
    let new_code = code_from(&second);

    // The superseded code no longer validates, and a wrong submission
    // against it does not count as an incorrect-code answer.
    if old_code != new_code {
        let outcome = engine
            .consume(consume_request(email, Purpose::Register, &old_code))
            .await?;
        assert!(matches!(
            outcome,
            ConsumeOutcome::IncorrectCode { .. } | ConsumeOutcome::NotFound
        ));
    }

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &new_code))
        .await?;
    assert!(matches!(outcome, ConsumeOutcome::Success { .. }));
    Ok(())
}

#[tokio::test]
async fn passcode_attempt_budget_is_exactly_five() -> Result<()> {
    let (_, engine) = engine();
    let email = "attempts@example.com";

    let mail = dispatched_email(engine.issue(issue_request(email, Purpose::Register)).await?);
    let code = code_from(&mail);
    let wrong = if code == "000000" { "000001" } else { "000000" };

    for expected_left in (1..=4).rev() {
        let outcome = engine
            .consume(consume_request(email, Purpose::Register, wrong))
            .await?;
        let ConsumeOutcome::IncorrectCode { attempts_remaining } = outcome else {
            panic!("expected incorrect code, got {outcome:?}");
        };
        assert_eq!(attempts_remaining, expected_left);
    }

    // Fifth wrong attempt exhausts the artifact.
    let outcome = engine
        .consume(consume_request(email, Purpose::Register, wrong))
        .await?;
    assert!(matches!(outcome, ConsumeOutcome::Expired));

    // Even the correct code is dead now.
    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    assert!(matches!(outcome, ConsumeOutcome::NotFound));
    Ok(())
}

#[tokio::test]
async fn consumed_code_does_not_validate_twice() -> Result<()> {
    let (_, engine) = engine();
    let email = "once@example.com";

    let mail = dispatched_email(engine.issue(issue_request(email, Purpose::Register)).await?);
    let code = code_from(&mail);

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    assert!(matches!(outcome, ConsumeOutcome::Success { .. }));

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    assert!(matches!(outcome, ConsumeOutcome::NotFound));
    Ok(())
}

#[tokio::test]
async fn persistable_parameters_survive_the_round_trip() -> Result<()> {
    let (_, engine) = engine();
    let email = "params@example.com";

    let mut request = issue_request(email, Purpose::Register);
    request.entry = RedirectContext {
        return_url: Some("https://www.example.com/briefing".to_string()),
        ref_code: Some("newsletter".to_string()),
        ..RedirectContext::default()
    };
    let mail = dispatched_email(engine.issue(request).await?);
    let code = code_from(&mail);

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    let ConsumeOutcome::Success { redirect, .. } = outcome else {
        panic!("expected success");
    };
    assert_eq!(
        redirect.return_url.as_deref(),
        Some("https://www.example.com/briefing")
    );
    assert_eq!(redirect.ref_code.as_deref(), Some("newsletter"));
    Ok(())
}

#[tokio::test]
async fn native_parameters_do_not_leak_from_the_entry_context() -> Result<()> {
    let (_, engine) = engine();
    let email = "native@example.com";

    // Native fields smuggled in via the entry context are dropped; only
    // the explicit issuance fields count, and this call sets none.
    let mut request = issue_request(email, Purpose::Register);
    request.entry = RedirectContext {
        app_client_id: Some("android_live_app".to_string()),
        from_uri: Some("app://smuggled".to_string()),
        ..RedirectContext::default()
    };
    let mail = dispatched_email(engine.issue(request).await?);
    let code = code_from(&mail);

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    let ConsumeOutcome::Success { redirect, .. } = outcome else {
        panic!("expected success");
    };
    assert!(redirect.app_client_id.is_none());
    assert!(redirect.from_uri.is_none());
    Ok(())
}

#[tokio::test]
async fn explicit_native_issuance_records_the_platform() -> Result<()> {
    let (accounts, engine) = engine();
    let email = "android@example.com";

    let mut request = issue_request(email, Purpose::Register);
    request.app_client_id = Some("android_live_app".to_string());
    request.from_uri = Some("app://callback".to_string());
    let mail = dispatched_email(engine.issue(request).await?);
    let code = code_from(&mail);

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    let ConsumeOutcome::Success { redirect, .. } = outcome else {
        panic!("expected success");
    };
    // Native context is not replayed from storage; the link did not carry
    // it, so the merged context is browser-shaped.
    assert!(redirect.from_uri.is_none());

    let account = accounts.get(email).await?.expect("account");
    assert_eq!(
        account
            .registration_platform
            .map(|platform| platform.as_str().to_string()),
        Some("android_live_app".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn reset_flow_for_recovery_account() -> Result<()> {
    let (accounts, engine) = engine();
    let email = "recovery@example.com";
    let mut account = Account::staged(email);
    account.status = AccountStatus::Recovery;
    account.has_password = true;
    account.email_validated = true;
    accounts.seed(account).await;

    let mail = dispatched_email(
        engine
            .issue(issue_request(email, Purpose::ResetPassword))
            .await?,
    );
    assert_eq!(mail.template, "reset_password");
    let token = token_from(&mail);

    let outcome = engine
        .consume(consume_request(email, Purpose::ResetPassword, &token))
        .await?;
    let ConsumeOutcome::Success {
        account,
        next_location,
        ..
    } = outcome
    else {
        panic!("expected success");
    };
    assert_eq!(next_location, "/reset-password/password");
    assert_eq!(account.status, AccountStatus::Active);
    Ok(())
}

#[tokio::test]
async fn set_password_flow_for_passwordless_account() -> Result<()> {
    let (accounts, engine) = engine();
    let email = "passwordless@example.com";
    let mut account = Account::staged(email);
    account.status = AccountStatus::Active;
    account.email_validated = true;
    accounts.seed(account).await;

    let mail = dispatched_email(
        engine
            .issue(issue_request(email, Purpose::SetPassword))
            .await?,
    );
    assert_eq!(mail.template, "set_password");
    let token = token_from(&mail);

    let outcome = engine
        .consume(consume_request(email, Purpose::SetPassword, &token))
        .await?;
    let ConsumeOutcome::Success {
        account,
        next_location,
        ..
    } = outcome
    else {
        panic!("expected success");
    };
    assert_eq!(next_location, "/set-password");
    assert!(account.has_password);
    Ok(())
}

#[tokio::test]
async fn staged_account_with_password_reviews_details() -> Result<()> {
    let (accounts, engine) = engine();
    let email = "review@example.com";
    let mut account = Account::staged(email);
    account.has_password = true;
    accounts.seed(account).await;

    let mail = dispatched_email(engine.issue(issue_request(email, Purpose::Register)).await?);
    let code = code_from(&mail);

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    let ConsumeOutcome::Success { next_location, .. } = outcome else {
        panic!("expected success");
    };
    assert_eq!(next_location, "/welcome/review");
    Ok(())
}

#[tokio::test]
async fn passcode_sign_in_redirects_with_from_uri_over_return_url() -> Result<()> {
    let (accounts, engine) = engine();
    let email = "signin@example.com";
    let mut account = Account::staged(email);
    account.status = AccountStatus::Active;
    account.has_password = true;
    account.email_validated = true;
    accounts.seed(account).await;

    let mut request = issue_request(email, Purpose::SignIn);
    request.variant = FlowVariant::PasscodeSignIn;
    request.entry = RedirectContext {
        return_url: Some("https://www.example.com/crosswords".to_string()),
        ..RedirectContext::default()
    };
    let mail = dispatched_email(engine.issue(request).await?);
    let code = code_from(&mail);

    // Native context presented on the link wins over the stored returnUrl.
    let mut consume = consume_request(email, Purpose::SignIn, &code);
    consume.link = RedirectContext {
        from_uri: Some("app://resume".to_string()),
        ..RedirectContext::default()
    };
    let outcome = engine.consume(consume).await?;
    let ConsumeOutcome::Success {
        account,
        next_location,
        ..
    } = outcome
    else {
        panic!("expected success");
    };
    assert_eq!(next_location, "app://resume");
    // Fully registered account: sign-in completion leaves the status alone.
    assert_eq!(account.status, AccountStatus::Active);
    Ok(())
}

#[tokio::test]
async fn suspended_account_never_transitions() -> Result<()> {
    let (accounts, engine) = engine();
    let email = "frozen@example.com";

    // Issue first, suspend afterwards: the pending code must go dead.
    let mail = dispatched_email(engine.issue(issue_request(email, Purpose::Register)).await?);
    let code = code_from(&mail);

    let mut account = accounts.get(email).await?.expect("account");
    account.status = AccountStatus::Suspended;
    accounts.seed(account).await;

    let outcome = engine
        .consume(consume_request(email, Purpose::Register, &code))
        .await?;
    assert!(matches!(outcome, ConsumeOutcome::AccountSuspended));

    let account = accounts.get(email).await?.expect("account");
    assert_eq!(account.status, AccountStatus::Suspended);
    assert!(!account.email_validated);
    Ok(())
}
