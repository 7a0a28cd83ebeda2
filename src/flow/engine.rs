//! The flow engine: issuance and consumption of verification artifacts.
//!
//! The engine owns the policy table from the flow contract: which secret
//! shape and email template each account status receives, how submitted
//! secrets are validated, and which lifecycle event a successful consumption
//! drives. Storage stays behind the repository seams.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::account::Account;
use super::artifact::{
    ArtifactRecord, Purpose, SecretKind, generate_passcode, generate_token, hash_secret,
    platform_from_token,
};
use super::config::FlowConfig;
use super::outcome::{
    ConsumeOutcome, EmailRequest, IssueOutcome, PeekOutcome, TEMPLATE_ACCOUNT_EXISTS,
    TEMPLATE_CREATE_PASSWORD, TEMPLATE_RESET_PASSWORD, TEMPLATE_SET_PASSWORD,
    TEMPLATE_VERIFICATION_CODE, next_location,
};
use super::redirect::RedirectContext;
use super::repo::{AccountRepository, ArtifactRepository, ConsumeLookup, CreateOutcome};
use super::status::{AccountStatus, RegistrationContext, RegistrationPlatform, StatusEvent};
use super::variant::FlowVariant;

/// Normalize an email for lookup; storage keeps the submitted casing.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Everything an issuance call carries.
#[derive(Clone, Debug)]
pub struct IssueRequest {
    pub email: String,
    pub purpose: Purpose,
    pub variant: FlowVariant,
    /// Context carried over from the entry page. Native-app parameters in
    /// here are ignored; only the explicit fields below count.
    pub entry: RedirectContext,
    pub app_client_id: Option<String>,
    pub from_uri: Option<String>,
    pub location: Option<String>,
    pub location_state: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ConsumeRequest {
    pub email: String,
    pub purpose: Purpose,
    pub secret: String,
    /// Parameters supplied on the consumption link itself.
    pub link: RedirectContext,
}

struct IssuePolicy {
    kind: SecretKind,
    template: &'static str,
    link_path: &'static str,
}

pub struct FlowEngine {
    accounts: Arc<dyn AccountRepository>,
    artifacts: Arc<dyn ArtifactRepository>,
    config: FlowConfig,
}

impl FlowEngine {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        artifacts: Arc<dyn ArtifactRepository>,
        config: FlowConfig,
    ) -> Self {
        Self {
            accounts,
            artifacts,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Issue a verification artifact for `(email, purpose)`.
    ///
    /// Re-issuance supersedes: the previous artifact stops validating as
    /// soon as the new one is stored.
    ///
    /// # Errors
    /// Returns an error only for infrastructure failures; policy refusals
    /// are outcomes.
    pub async fn issue(&self, request: IssueRequest) -> Result<IssueOutcome> {
        let email = normalize_email(&request.email);

        let account = match self.accounts.get(&email).await? {
            Some(account) => account,
            None => {
                if request.purpose != Purpose::Register {
                    // Unknown account on a code path: show the enter-code
                    // page, send nothing, keep the response shape real.
                    return Ok(IssueOutcome::CodeEntryOnly {
                        decoy_id: Uuid::new_v4(),
                    });
                }
                let staged = Account::staged(&email);
                match self.accounts.create(&staged).await? {
                    CreateOutcome::Created => staged,
                    CreateOutcome::Conflict => self
                        .accounts
                        .get(&email)
                        .await?
                        .context("account missing after create conflict")?,
                }
            }
        };

        if account.status == AccountStatus::Suspended {
            return Ok(IssueOutcome::Suspended);
        }

        let platform = self.config.native_platform(request.app_client_id.as_deref());

        // Persistables from the entry context; native parameters only from
        // this call's explicit fields, never carried over.
        let mut stored = request.entry.for_issuance(false);
        stored.app_client_id = request.app_client_id.clone();
        stored.from_uri = request.from_uri.clone();

        let policy = issue_policy(&account, request.purpose, request.variant);
        let secret = match policy.kind {
            SecretKind::Passcode => generate_passcode(),
            SecretKind::Token => generate_token(platform)?,
        };

        let record = ArtifactRecord {
            id: Uuid::new_v4(),
            email: email.clone(),
            purpose: request.purpose,
            kind: policy.kind,
            secret_hash: hash_secret(&secret),
            attempts_remaining: self.config.passcode_attempts(),
            platform,
            location: request.location.clone(),
            location_state: request.location_state.clone(),
            redirect: stored.clone(),
            ttl: self.config.artifact_ttl(),
        };
        let artifact_id = self.artifacts.put(record).await?;

        let email_request =
            self.build_email(&email, &policy, &secret, &stored, request.variant);

        info!(
            %artifact_id,
            purpose = request.purpose.as_str(),
            template = email_request.template,
            "issued verification artifact"
        );

        Ok(IssueOutcome::Dispatched {
            artifact_id,
            email: email_request,
        })
    }

    /// Validate a submitted secret and drive the account transition.
    ///
    /// # Errors
    /// Returns an error only for infrastructure failures.
    pub async fn consume(&self, request: ConsumeRequest) -> Result<ConsumeOutcome> {
        let email = normalize_email(&request.email);
        let secret = request.secret.trim();

        let account = self.accounts.get(&email).await?;
        if account
            .as_ref()
            .is_some_and(|account| account.status == AccountStatus::Suspended)
        {
            return Ok(ConsumeOutcome::AccountSuspended);
        }

        let lookup = self
            .artifacts
            .consume(&email, request.purpose, &hash_secret(secret))
            .await?;

        match lookup {
            ConsumeLookup::Missing => Ok(ConsumeOutcome::NotFound),
            ConsumeLookup::TtlExpired => Ok(ConsumeOutcome::Expired),
            ConsumeLookup::Mismatch { attempts_remaining } => {
                if attempts_remaining <= 0 {
                    // The final failed attempt exhausts the artifact; the
                    // caller is sent back to the issuance step.
                    Ok(ConsumeOutcome::Expired)
                } else {
                    Ok(ConsumeOutcome::IncorrectCode { attempts_remaining })
                }
            }
            ConsumeLookup::Matched(record) => {
                let Some(prior) = account else {
                    // The account disappeared under the artifact; treat the
                    // submission as stale.
                    return Ok(ConsumeOutcome::NotFound);
                };

                let merged = record.redirect.merge_link(&request.link);
                let platform =
                    self.resolve_platform(record.platform, secret, merged.app_client_id.as_deref());
                let registration = RegistrationContext {
                    platform: Some(platform),
                    location: record.location,
                    location_state: record.location_state,
                };

                let event = match request.purpose {
                    Purpose::Register | Purpose::SignIn => {
                        if prior.email_validated && prior.has_password {
                            // Already fully registered: sign-in completion,
                            // nothing to transition.
                            None
                        } else {
                            Some(StatusEvent::EmailVerified(registration))
                        }
                    }
                    Purpose::ResetPassword | Purpose::SetPassword => {
                        Some(StatusEvent::PasswordSet(registration))
                    }
                };

                let updated = match &event {
                    Some(event) => self.accounts.transition(&email, event).await?,
                    None => prior.clone(),
                };

                let location = next_location(
                    request.purpose,
                    &prior,
                    &merged,
                    self.config.completion_fallback(),
                );

                info!(
                    purpose = request.purpose.as_str(),
                    status = updated.status.as_str(),
                    next_location = %location,
                    "verification artifact consumed"
                );

                Ok(ConsumeOutcome::Success {
                    account: updated,
                    next_location: location,
                    redirect: merged,
                })
            }
        }
    }

    /// Read-only view for back-navigation banners; never mutates artifact
    /// or account state.
    ///
    /// # Errors
    /// Returns an error only for infrastructure failures.
    pub async fn peek(&self, email: &str, purpose: Purpose) -> Result<PeekOutcome> {
        let email = normalize_email(email);
        match self.artifacts.peek(&email, purpose).await? {
            None => Ok(PeekOutcome::Nothing),
            Some(peek) if peek.consumed => Ok(PeekOutcome::Verified {
                redirect: peek.redirect,
            }),
            Some(_) => Ok(PeekOutcome::Pending),
        }
    }

    fn build_email(
        &self,
        email: &str,
        policy: &IssuePolicy,
        secret: &str,
        stored: &RedirectContext,
        variant: FlowVariant,
    ) -> EmailRequest {
        let payload = match policy.kind {
            SecretKind::Passcode => json!({
                "email": email,
                "code": secret,
            }),
            SecretKind::Token => {
                let link = build_link(
                    self.config.frontend_base_url(),
                    policy.link_path,
                    secret,
                    stored,
                );
                let mut payload = json!({
                    "email": email,
                    "link": link,
                });
                if policy.template == TEMPLATE_ACCOUNT_EXISTS
                    && variant == FlowVariant::OktaClassic
                {
                    // Classic account-exists mail offers sign-in alongside
                    // the reset link.
                    let base = self.config.frontend_base_url().trim_end_matches('/');
                    let query = stored.to_query();
                    let sign_in = if query.is_empty() {
                        format!("{base}/signin")
                    } else {
                        format!("{base}/signin?{query}")
                    };
                    payload["sign_in_link"] = json!(sign_in);
                }
                payload
            }
        };
        EmailRequest {
            to_email: email.to_string(),
            template: policy.template,
            payload,
        }
    }

    fn resolve_platform(
        &self,
        recorded: RegistrationPlatform,
        secret: &str,
        link_app_client_id: Option<&str>,
    ) -> RegistrationPlatform {
        if recorded != RegistrationPlatform::Profile {
            return recorded;
        }
        let from_token = platform_from_token(secret);
        if from_token != RegistrationPlatform::Profile {
            return from_token;
        }
        self.config.native_platform(link_app_client_id)
    }
}

/// Secret shape for flows that are not otherwise forced to a token.
fn kind_for(variant: FlowVariant) -> SecretKind {
    match variant {
        FlowVariant::OktaClassic => SecretKind::Token,
        FlowVariant::Okta | FlowVariant::PasscodeSignIn => SecretKind::Passcode,
    }
}

fn issue_policy(account: &Account, purpose: Purpose, variant: FlowVariant) -> IssuePolicy {
    match purpose {
        Purpose::Register | Purpose::SignIn => {
            if purpose == Purpose::SignIn && variant == FlowVariant::PasscodeSignIn {
                // Passcode sign-in always emails a code, even to accounts
                // that finished registration long ago.
                IssuePolicy {
                    kind: SecretKind::Passcode,
                    template: TEMPLATE_VERIFICATION_CODE,
                    link_path: "",
                }
            } else if account.email_validated && account.has_password {
                // Registration against a finished account: reset CTA, with
                // a sign-in alternative added for the classic flow.
                IssuePolicy {
                    kind: SecretKind::Token,
                    template: TEMPLATE_ACCOUNT_EXISTS,
                    link_path: "/reset-password",
                }
            } else if account.status == AccountStatus::Active {
                // Passwordless or unvalidated active account: force a
                // password before further sign-in.
                match kind_for(variant) {
                    SecretKind::Passcode => IssuePolicy {
                        kind: SecretKind::Passcode,
                        template: TEMPLATE_VERIFICATION_CODE,
                        link_path: "",
                    },
                    SecretKind::Token => IssuePolicy {
                        kind: SecretKind::Token,
                        template: TEMPLATE_SET_PASSWORD,
                        link_path: "/set-password",
                    },
                }
            } else {
                match kind_for(variant) {
                    SecretKind::Passcode => IssuePolicy {
                        kind: SecretKind::Passcode,
                        template: TEMPLATE_VERIFICATION_CODE,
                        link_path: "",
                    },
                    SecretKind::Token => IssuePolicy {
                        kind: SecretKind::Token,
                        template: TEMPLATE_CREATE_PASSWORD,
                        link_path: "/welcome",
                    },
                }
            }
        }
        Purpose::ResetPassword | Purpose::SetPassword => {
            if account.has_password {
                IssuePolicy {
                    kind: SecretKind::Token,
                    template: TEMPLATE_RESET_PASSWORD,
                    link_path: "/reset-password",
                }
            } else {
                IssuePolicy {
                    kind: SecretKind::Token,
                    template: TEMPLATE_SET_PASSWORD,
                    link_path: "/set-password",
                }
            }
        }
    }
}

fn build_link(base: &str, path: &str, token: &str, ctx: &RedirectContext) -> String {
    let base = base.trim_end_matches('/');
    let query = ctx.to_query();
    if query.is_empty() {
        format!("{base}{path}/{token}")
    } else {
        format!("{base}{path}/{token}?{query}")
    }
}
