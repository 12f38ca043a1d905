//! Commands valid only before authentication: STARTTLS, LOGIN, AUTHENTICATE.

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    backend::{Directory, Storage, User},
    server::{
        command::{PostAction, QueuedCommand},
        connection::{Connection, Reservation},
        sasl::{cram_md5_digest, SaslCredentials, SaslMachine, SaslStep},
    },
    types::{
        auth::AuthMechanism,
        core::{AString, Secret},
        response::{Continue, Response},
        state::ConnectionState,
    },
};

impl<S, B> Connection<S, B>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    B: Storage + Directory,
{
    /// STARTTLS answers OK first; the actual interposition happens after the
    /// OK went out, so that no plaintext command can sneak in behind it.
    pub(crate) fn starttls(&mut self, cmd: &mut QueuedCommand) {
        if self.tls_active {
            cmd.no(None, "Already in TLS mode");
            return;
        }

        if !self.engine.config.use_tls || self.engine.tls.is_none() {
            cmd.no(None, "TLS is not available");
            return;
        }

        cmd.ok(None);
        cmd.action = Some(PostAction::StartTls);
    }

    pub(crate) async fn login(
        &mut self,
        cmd: &mut QueuedCommand,
        username: AString,
        password: Secret<AString>,
    ) {
        if !self.engine.config.plaintext_allowed(self.tls_active) {
            cmd.no(None, "LOGIN is disabled until the connection is encrypted");
            return;
        }

        let Some(login) = username.to_str() else {
            cmd.bad("Invalid userid");
            return;
        };

        let credentials = SaslCredentials::Secret {
            login: login.to_owned(),
            secret: password.declassify().as_bytes().to_vec(),
        };

        match self.verify_sasl(credentials).await {
            Ok(user) => {
                self.authenticated(user);
                cmd.ok(None);
            }
            Err(text) => cmd.no(None, text),
        }
    }

    pub(crate) async fn authenticate(
        &mut self,
        cmd: &mut QueuedCommand,
        mechanism: AuthMechanism,
        initial_response: Option<Secret<Vec<u8>>>,
    ) {
        if !self.mechanism_enabled(&mechanism) {
            cmd.no(None, "Unsupported authentication mechanism");
            return;
        }

        let Some(mut machine) = SaslMachine::new(&mechanism, &self.engine.config.hostname)
        else {
            cmd.no(None, "Unsupported authentication mechanism");
            return;
        };

        match initial_response {
            // SASL-IR: the first exchange line came with the command.
            Some(data) => {
                let step = machine.step(data.declassify());
                self.sasl_step_for(cmd, machine, step).await;
            }
            None => {
                cmd.responses.push(Response::Continue(Continue::Base64(
                    machine.initial_challenge(),
                )));
                self.reader = Some(Reservation::Authenticate {
                    command_id: cmd.id,
                    machine,
                });
            }
        }
    }

    fn mechanism_enabled(&self, mechanism: &AuthMechanism) -> bool {
        let config = &self.engine.config;

        match mechanism {
            AuthMechanism::Plain => {
                config.auth_plain && config.plaintext_allowed(self.tls_active)
            }
            AuthMechanism::Login => {
                config.auth_login && config.plaintext_allowed(self.tls_active)
            }
            AuthMechanism::CramMd5 => config.auth_cram_md5,
            AuthMechanism::Anonymous => config.auth_anonymous,
            AuthMechanism::Other(_) => false,
        }
    }

    /// Applies one step of a SASL exchange to the command that started it.
    pub(crate) async fn sasl_step_for(
        &mut self,
        cmd: &mut QueuedCommand,
        machine: SaslMachine,
        step: SaslStep,
    ) {
        match step {
            SaslStep::Challenge(challenge) => {
                cmd.responses
                    .push(Response::Continue(Continue::Base64(challenge)));
                self.reader = Some(Reservation::Authenticate {
                    command_id: cmd.id,
                    machine,
                });
            }
            SaslStep::Credentials(credentials) => match self.verify_sasl(credentials).await {
                Ok(user) => {
                    self.authenticated(user);
                    cmd.ok(None);
                }
                Err(text) => cmd.no(None, text),
            },
            SaslStep::Failed(text) => cmd.bad(text),
        }
    }

    /// Checks credentials against the directory.
    pub(crate) async fn verify_sasl(
        &mut self,
        credentials: SaslCredentials,
    ) -> Result<User, &'static str> {
        const FAILED: &str = "Authentication failed";

        match credentials {
            SaslCredentials::Secret { login, secret } => {
                let user = self
                    .engine
                    .backend
                    .resolve_login(&login)
                    .await
                    .map_err(|_| FAILED)?
                    .ok_or(FAILED)?;

                match self.engine.backend.verify_secret(&user, &secret).await {
                    Ok(true) => Ok(user),
                    _ => Err(FAILED),
                }
            }
            SaslCredentials::CramMd5 {
                login,
                digest,
                challenge,
            } => {
                let user = self
                    .engine
                    .backend
                    .resolve_login(&login)
                    .await
                    .map_err(|_| FAILED)?
                    .ok_or(FAILED)?;

                let secret = self
                    .engine
                    .backend
                    .secret(&user)
                    .await
                    .map_err(|_| FAILED)?
                    .ok_or("Mechanism unavailable for this account")?;

                if cram_md5_digest(&secret, &challenge) == digest {
                    Ok(user)
                } else {
                    Err(FAILED)
                }
            }
            SaslCredentials::Anonymous { trace } => {
                debug!("anonymous login, trace: {trace}");

                self.engine
                    .backend
                    .resolve_login("anonymous")
                    .await
                    .map_err(|_| FAILED)?
                    .ok_or("Anonymous login is not available")
            }
        }
    }

    fn authenticated(&mut self, user: User) {
        info!("logged in as {}", user.login);
        self.user = Some(user);
        self.state = ConnectionState::Authenticated;
    }
}
