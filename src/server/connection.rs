//! The per-connection driver.
//!
//! One task per connection. The driver frames input, queues commands, admits
//! them for execution according to their concurrency group, runs the
//! handlers, and emits responses in arrival order. The admission rules are:
//!
//! * a command with group 0 may only run when no other command is executing;
//! * a command with a nonzero group may run together with other commands of
//!   the same group;
//! * argument parsing of queued commands is deferred while a group-0 command
//!   is executing, because e.g. MSN arguments remain meaningless until an
//!   earlier SELECT has completed;
//! * a command that is invalid in the current state is rejected only once no
//!   earlier command could still change the state.

use std::{collections::VecDeque, sync::Arc};

use bytes::BytesMut;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::watch,
};

use crate::{
    backend::{ChangeEvent, Directory, Storage},
    codec::{
        AuthenticateDataCodec, CommandCodec, CommandDecodeError, Decoder, Encoder, GreetingCodec,
        IdleDoneCodec, ResponseCodec,
    },
    framer::{Exceeded, FragmentInfo, Framer, LiteralAnnouncement},
    server::{
        command::{lookup, PostAction, Progress, QueuedCommand},
        sasl::SaslMachine,
        session::Session,
        Engine,
    },
    tls::MaybeTls,
    types::{
        auth::AuthenticateData,
        command::{Command, CommandBody},
        core::{LiteralMode, Tag, Vec1},
        response::{Capability, Code, Continue, Greeting, Response, Status},
        state::ConnectionState,
    },
};

/// Inactivity limits, in seconds.
const PREAUTH_TIMEOUT: u64 = 120;
const ACTIVE_TIMEOUT: u64 = 1_800;
const RESERVED_TIMEOUT: u64 = 10_800;

/// Bytes accepted before authentication; beyond this the client is cut off.
const PREAUTH_BYTE_LIMIT: u64 = 32_768;

/// Input reserved by a command that reads beyond its own line.
#[derive(Debug)]
pub(crate) enum Reservation {
    /// An AUTHENTICATE exchange is in progress.
    Authenticate {
        command_id: u64,
        machine: SaslMachine,
    },
    /// The connection is idling; only `DONE` ends it.
    Idle { command_id: u64 },
}

/// A single client connection.
pub struct Connection<S, B> {
    pub(crate) engine: Arc<Engine<B>>,
    stream: MaybeTls<S>,
    shutdown: watch::Receiver<bool>,

    framer: Framer,
    out: BytesMut,

    pub(crate) state: ConnectionState,
    pub(crate) tls_active: bool,
    pub(crate) user: Option<crate::backend::User>,
    pub(crate) session: Option<Session>,

    commands: VecDeque<QueuedCommand>,
    pub(crate) reader: Option<Reservation>,
    next_command_id: u64,
    pending_action: Option<PostAction>,

    bytes_arrived: u64,
    closing: bool,
}

impl<S, B> std::fmt::Debug for Connection<S, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("tls_active", &self.tls_active)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl<S, B> Connection<S, B>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    B: Storage + Directory,
{
    pub fn new(
        engine: Arc<Engine<B>>,
        stream: S,
        tls_active: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let framer = Framer::new(
            engine.config.max_line_length,
            engine
                .config
                .max_line_length
                .saturating_add(engine.config.max_literal_size),
        );

        Self {
            engine,
            stream: MaybeTls::Plain(stream),
            shutdown,
            framer,
            out: BytesMut::new(),
            state: ConnectionState::NotAuthenticated,
            tls_active,
            user: None,
            session: None,
            commands: VecDeque::new(),
            reader: None,
            next_command_id: 1,
            pending_action: None,
            bytes_arrived: 0,
            closing: false,
        }
    }

    /// Serves the connection until the client logs out, times out, the
    /// server shuts down, or the stream fails.
    pub async fn run(mut self) -> std::io::Result<()> {
        self.enqueue_greeting();
        self.flush().await?;

        let mut chunk = [0u8; 8 * 1024];

        loop {
            self.process_input().await?;
            self.run_commands().await;
            self.emit_responses();
            self.flush().await?;

            match self.pending_action.take() {
                Some(PostAction::Logout) => break,
                Some(PostAction::StartTls) => self.interpose_tls().await?,
                None => {}
            }

            if self.closing {
                break;
            }

            // A gate that opened (rejected STARTTLS, reservation now active)
            // leaves buffered bytes behind; they must be processed without
            // waiting for more input.
            if !self.input_gate() && self.framer.has_unparsed_bytes() {
                continue;
            }

            let timeout = std::time::Duration::from_secs(self.timeout_seconds());
            let idling = matches!(self.reader, Some(Reservation::Idle { .. }));

            let stream = &mut self.stream;
            let session = &mut self.session;
            let shutdown = &mut self.shutdown;

            enum Wake {
                Read(usize),
                Event(Option<ChangeEvent>),
                Timeout,
                Shutdown,
            }

            let wake = tokio::select! {
                read = stream.read(&mut chunk) => Wake::Read(read?),
                event = next_session_event(session) => Wake::Event(event),
                _ = shutdown.changed() => Wake::Shutdown,
                _ = tokio::time::sleep(timeout) => Wake::Timeout,
            };

            match wake {
                Wake::Read(0) => {
                    // Client disconnected; drop everything without a response.
                    if self.state != ConnectionState::Logout {
                        info!("unexpected close by client");
                    }
                    return Ok(());
                }
                Wake::Read(read) => {
                    if self.state == ConnectionState::NotAuthenticated {
                        self.bytes_arrived += read as u64;

                        if self.bytes_arrived > PREAUTH_BYTE_LIMIT {
                            info!(">32k received before login");
                            self.enqueue_bye("overlong login sequence");
                            self.flush().await?;
                            return Ok(());
                        }
                    }

                    self.framer.enqueue_bytes(&chunk[..read]);
                }
                Wake::Event(Some(event)) => {
                    if let Some(session) = self.session.as_mut() {
                        session.buffer(event);

                        if idling {
                            // During IDLE, updates flow immediately.
                            let mut updates = Vec::new();
                            session.flush(true, &mut updates);
                            for response in &updates {
                                self.enqueue_response(response);
                            }
                            self.flush().await?;
                        }
                    }
                }
                Wake::Event(None) => {
                    // Event channel gone, i.e., mailbox deleted.
                    if let Some(session) = self.session.as_mut() {
                        session.deleted = true;
                    }
                }
                Wake::Timeout => {
                    info!("idle timeout in state {}", self.state);
                    self.enqueue_bye("autologout");
                    self.flush().await?;
                    return Ok(());
                }
                Wake::Shutdown => {
                    self.enqueue_bye("server shutdown");
                    self.flush().await?;
                    return Ok(());
                }
            }
        }

        self.flush().await?;
        let _ = self.stream.shutdown().await;

        Ok(())
    }

    fn timeout_seconds(&self) -> u64 {
        if self.reader.is_some() {
            RESERVED_TIMEOUT
        } else if self.state == ConnectionState::NotAuthenticated {
            PREAUTH_TIMEOUT
        } else {
            ACTIVE_TIMEOUT
        }
    }

    // ----- Output ------------------------------------------------------------------------------

    fn enqueue_greeting(&mut self) {
        let code = Code::Capability(self.capabilities());
        let text = format!("{} imapd ready", self.engine.config.hostname);
        // Safety: the hostname is validated at config load.
        let greeting = Greeting::ok(Some(code), &text).unwrap();

        let encoded = GreetingCodec.encode(&greeting).dump();
        self.out.extend_from_slice(&encoded);
    }

    pub(crate) fn enqueue_response(&mut self, response: &Response) {
        let encoded = ResponseCodec.encode(response).dump();
        self.out.extend_from_slice(&encoded);
    }

    fn enqueue_bye(&mut self, text: &str) {
        // Safety: all BYE texts used here are valid response text.
        let bye = Status::bye(None, text).unwrap();
        self.enqueue_response(&Response::Status(bye));
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        if self.out.is_empty() {
            return Ok(());
        }

        let data = self.out.split();
        self.stream.write_all(&data).await?;
        self.stream.flush().await
    }

    /// The capabilities currently applicable. A mechanism that would be
    /// rejected on this connection is never advertised.
    pub(crate) fn capabilities(&self) -> Vec1<Capability> {
        let config = &self.engine.config;
        let mut caps = vec![Capability::Imap4Rev1];

        if self.state == ConnectionState::NotAuthenticated {
            if !self.tls_active && config.use_tls && self.engine.tls.is_some() {
                caps.push(Capability::StartTls);
            }

            let plaintext = config.plaintext_allowed(self.tls_active);

            if !plaintext {
                caps.push(Capability::LoginDisabled);
            }

            if config.auth_plain && plaintext {
                caps.push(Capability::Auth(crate::types::auth::AuthMechanism::Plain));
            }
            if config.auth_login && plaintext {
                caps.push(Capability::Auth(crate::types::auth::AuthMechanism::Login));
            }
            if config.auth_cram_md5 {
                caps.push(Capability::Auth(crate::types::auth::AuthMechanism::CramMd5));
            }
            if config.auth_anonymous {
                caps.push(Capability::Auth(
                    crate::types::auth::AuthMechanism::Anonymous,
                ));
            }
        }

        caps.extend([
            Capability::LiteralPlus,
            Capability::Idle,
            Capability::Id,
            Capability::Namespace,
            Capability::UidPlus,
            Capability::Unselect,
            Capability::Children,
            Capability::CondStore,
            Capability::Acl,
            Capability::Rights("ekntx".to_owned()),
        ]);

        // Safety: the list always contains IMAP4rev1.
        Vec1::try_from(caps).unwrap()
    }

    // ----- Input -------------------------------------------------------------------------------

    /// Whether framing must pause.
    ///
    /// Bytes behind a STARTTLS command belong to the TLS handshake. Bytes
    /// behind an AUTHENTICATE or IDLE command belong to that command's
    /// reserved input, which only exists once the command has started; until
    /// then they must not be framed as commands either.
    fn input_gate(&self) -> bool {
        if self.pending_action == Some(PostAction::StartTls) {
            return true;
        }

        if self.commands.iter().any(|cmd| cmd.spec.name == "STARTTLS") {
            return true;
        }

        // An active reservation routes input itself.
        if self.reader.is_some() {
            return false;
        }

        self.commands.iter().any(|cmd| {
            matches!(cmd.spec.name, "AUTHENTICATE" | "IDLE")
                && cmd.progress != Progress::Finished
        })
    }

    /// Drives the framer over everything buffered so far, emitting literal
    /// continuations and queueing complete messages.
    async fn process_input(&mut self) -> std::io::Result<()> {
        loop {
            if self.input_gate() {
                return Ok(());
            }

            let Some(fragment) = self.framer.progress() else {
                return Ok(());
            };

            if let Some(Exceeded::LineLength) = self.framer.exceeded() {
                // Overlong line: the only safe reaction is to cut the
                // connection, since we may be desynchronized.
                self.enqueue_bye("line too long");
                self.flush().await?;
                self.closing = true;
                return Ok(());
            }

            // A synchronizing literal needs a go-ahead before the client
            // sends more data.
            if let FragmentInfo::Line {
                announcement:
                    Some(LiteralAnnouncement {
                        mode: LiteralMode::Sync,
                        length,
                    }),
                ..
            } = fragment
            {
                if length > self.engine.config.max_literal_size {
                    match self.framer.decode_tag() {
                        Some(tag) => {
                            let bad = Status::bad(Some(tag), None, "Literal too large").unwrap();
                            self.enqueue_response(&Response::Status(bad));
                            self.framer.skip_message();
                        }
                        None => {
                            self.enqueue_bye("oversized literal in malformed command");
                            self.flush().await?;
                            self.closing = true;
                            return Ok(());
                        }
                    }
                } else {
                    let go_ahead = Continue::basic(None, "reading literal").unwrap();
                    self.enqueue_response(&Response::Continue(go_ahead));
                }

                self.flush().await?;
                continue;
            }

            if self.framer.is_message_complete() {
                self.accept_message().await;
            }
        }
    }

    /// Routes one complete framed message: to the reserving command if a
    /// reservation is active, to the command queue otherwise.
    async fn accept_message(&mut self) {
        if self.framer.exceeded().is_some() {
            match self.framer.decode_tag() {
                Some(tag) => {
                    let bad = Status::bad(Some(tag), None, "Command too long").unwrap();
                    self.enqueue_response(&Response::Status(bad));
                }
                None => self.enqueue_response(&Response::Status(
                    Status::bad(None, None, "Command too long").unwrap(),
                )),
            }
            return;
        }

        match self.reader.take() {
            Some(Reservation::Idle { command_id }) => {
                self.idle_done(command_id);
            }
            Some(Reservation::Authenticate {
                command_id,
                machine,
            }) => {
                self.authenticate_line(command_id, machine).await;
            }
            None => self.enqueue_command(),
        }
    }

    /// Ends IDLE when the reserved input is `DONE`.
    fn idle_done(&mut self, command_id: u64) {
        let done = self.framer.decode_message(&IdleDoneCodec).is_ok();

        if let Some(cmd) = self
            .commands
            .iter_mut()
            .find(|cmd| cmd.id == command_id)
        {
            if done {
                cmd.ok(None);
            } else {
                cmd.bad("Expected DONE");
            }
        }
    }

    /// Feeds one line of the AUTHENTICATE exchange into the SASL machine.
    async fn authenticate_line(&mut self, command_id: u64, mut machine: SaslMachine) {
        let Some(position) = self
            .commands
            .iter()
            .position(|cmd| cmd.id == command_id)
        else {
            return;
        };

        let mut cmd = self.commands.remove(position).unwrap();

        match self.framer.decode_message(&AuthenticateDataCodec) {
            Ok(AuthenticateData::Cancel) => cmd.bad("Authentication cancelled"),
            Ok(AuthenticateData::Continue(line)) => {
                let step = machine.step(line.declassify());
                self.sasl_step_for(&mut cmd, machine, step).await;
            }
            Err(_) => cmd.bad("Invalid authentication response"),
        }

        self.commands.insert(position, cmd);
    }

    /// Queues a freshly framed message as a command.
    fn enqueue_command(&mut self) {
        let raw = self.framer.message_bytes().to_vec();

        let (tag, name) = match preparse(&raw) {
            Ok(parts) => parts,
            Err(()) => {
                debug!("malformed command line");
                let bad = match self.framer.decode_tag() {
                    Some(tag) => Status::bad(Some(tag), None, "Invalid command line").unwrap(),
                    None => Status::bad(None, None, "Invalid tag").unwrap(),
                };
                self.enqueue_response(&Response::Status(bad));
                return;
            }
        };

        let Some(spec) = lookup(&name) else {
            // If the tag itself names a command, the client probably forgot
            // the tag.
            let text = if lookup(tag.as_ref()).is_some() {
                format!("No such command: {name} (an IMAP command is prefixed by a tag)")
            } else {
                format!("No such command: {name}")
            };

            let bad = Status::bad(Some(tag), None, text.as_str())
                .unwrap_or_else(|_| Status::bad(None, None, "No such command").unwrap());
            self.enqueue_response(&Response::Status(bad));
            return;
        };

        let id = self.next_command_id;
        self.next_command_id += 1;

        debug!("queued {} (tag {})", spec.name, tag.as_ref());
        self.commands
            .push_back(QueuedCommand::new(id, raw, tag, spec));
    }

    // ----- Command machinery -------------------------------------------------------------------

    /// Parses, admits, and runs queued commands until nothing changes.
    ///
    /// Within one pass: all executing commands run once (to completion, or
    /// until they reserve input); then, if nothing is executing, the oldest
    /// blocked command and its group followers are admitted; finally,
    /// unparsed commands are parsed unless a group-0 command is executing.
    async fn run_commands(&mut self) {
        let mut done = false;

        while !done {
            done = true;

            // Run all currently executing commands once, in arrival order.
            let mut index = 0;
            while index < self.commands.len() {
                if self.commands[index].progress == Progress::Executing
                    && self.commands[index].parsed.is_some()
                {
                    let mut cmd = self.commands.remove(index).unwrap();
                    self.execute(&mut cmd).await;
                    self.commands.insert(index, cmd);
                    done = false;
                }
                index += 1;
            }

            // If no command is executing, start the oldest blocked command
            // and any directly following commands of the same group.
            let executing = self
                .commands
                .iter()
                .any(|cmd| cmd.progress == Progress::Executing);

            if !executing {
                if let Some(first) = self
                    .commands
                    .iter()
                    .position(|cmd| cmd.progress == Progress::Blocked)
                {
                    let group = self.commands[first].spec.group;
                    self.commands[first].progress = Progress::Executing;
                    done = false;

                    if group != 0 {
                        for cmd in self.commands.iter_mut().skip(first + 1) {
                            if cmd.spec.group == group && cmd.progress == Progress::Blocked {
                                cmd.progress = Progress::Executing;
                            } else {
                                break;
                            }
                        }
                    }
                }
            }

            // Parse unparsed commands, unless a group-0 command is executing
            // (its completion may change what the arguments mean).
            let mut executing_group: Option<u8> = None;

            for index in 0..self.commands.len() {
                if executing_group == Some(0) {
                    break;
                }

                match self.commands[index].progress {
                    Progress::Executing | Progress::Blocked => {
                        executing_group = Some(self.commands[index].spec.group);
                    }
                    Progress::Unparsed => {
                        if self.commands[index].spec.valid_in.allows(self.state) {
                            done = false;
                            let admitted = self.parse_command(index);

                            if admitted && executing_group.is_some() {
                                self.commands[index].progress = Progress::Blocked;
                            }
                            if admitted {
                                executing_group =
                                    Some(self.commands[index].spec.group);
                            }
                        } else if executing_group.is_none() {
                            // No earlier command can change the state, so
                            // the command has to be rejected.
                            done = false;
                            self.commands[index].bad("Not permitted in this state");
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Parses the arguments of one queued command. Returns whether the
    /// command was admitted (parsed successfully).
    fn parse_command(&mut self, index: usize) -> bool {
        let cmd = &mut self.commands[index];

        match CommandCodec.decode(&cmd.raw) {
            Ok((_, command)) => {
                cmd.parsed = Some(command);
                cmd.progress = Progress::Executing;
                true
            }
            Err(CommandDecodeError::Failed { position }) => {
                cmd.bad(&format!("Parse error at position {position}"));
                false
            }
            Err(CommandDecodeError::LiteralFound { .. }) | Err(CommandDecodeError::Incomplete) => {
                // The framer only hands over complete messages; a dangling
                // literal here means the client lied about the length.
                cmd.bad("Truncated command");
                false
            }
        }
    }

    /// Emits responses of finished commands, in arrival order, and retires
    /// them. Pending session updates are interleaved at the allowed points.
    fn emit_responses(&mut self) {
        loop {
            let Some(front) = self.commands.front() else {
                break;
            };

            if front.progress != Progress::Finished {
                // A command that reserved input may still have continuation
                // or untagged output to emit.
                if front.progress == Progress::Executing && !front.responses.is_empty() {
                    let mut cmd = self.commands.pop_front().unwrap();
                    for response in std::mem::take(&mut cmd.responses) {
                        self.enqueue_response(&response);
                    }
                    self.commands.push_front(cmd);
                }
                break;
            }

            let mut cmd = self.commands.pop_front().unwrap();

            // Between complete responses is the only place where EXISTS and
            // friends may appear; expunges additionally require that no
            // MSN-bearing output of this command is pending, which holds for
            // the pure checkpoint commands.
            let allow_expunge = matches!(cmd.spec.name, "NOOP" | "CHECK");
            let mut session_updates = Vec::new();
            if let Some(session) = self.session.as_mut() {
                session.flush(allow_expunge, &mut session_updates);
            }
            for response in &session_updates {
                self.enqueue_response(response);
            }

            for response in std::mem::take(&mut cmd.responses) {
                self.enqueue_response(&response);
            }

            if let Some(completion) = cmd.completion.take() {
                self.enqueue_response(&Response::Status(completion));
            }

            if let Some(action) = cmd.action.take() {
                self.pending_action = Some(action);
            }

            cmd.progress = Progress::Retired;
            // Retired commands leave the queue.
        }

        // All commands done: this is "between commands", the point where
        // held-back expunges may go out.
        if self.commands.is_empty() {
            let mut session_updates = Vec::new();
            if let Some(session) = self.session.as_mut() {
                session.flush(true, &mut session_updates);
            }
            for response in &session_updates {
                self.enqueue_response(response);
            }
        }

        // A deleted mailbox ends the session. So does a session that lagged
        // behind the event stream: its view can no longer be trusted, and
        // forcing the client to re-select is the only honest answer.
        if self.session.as_ref().map_or(false, |session| {
            session.deleted || session.is_desynchronized()
        }) {
            self.session = None;
            self.state = ConnectionState::Authenticated;
            let status = Status::no(None, None, "Mailbox state lost; please re-select").unwrap();
            self.enqueue_response(&Response::Status(status));
        }
    }

    // ----- Execution ---------------------------------------------------------------------------

    /// Runs one admitted command to completion (or to its input
    /// reservation).
    async fn execute(&mut self, cmd: &mut QueuedCommand) {
        // Safety: callers only pass commands whose `parsed` is set.
        let Command { body, .. } = cmd.parsed.take().unwrap();

        match body {
            // Any state.
            CommandBody::Capability => self.capability(cmd),
            CommandBody::Noop => cmd.ok(None),
            CommandBody::Logout => self.logout(cmd),
            CommandBody::Id { parameters } => self.id(cmd, parameters),

            // Not authenticated.
            CommandBody::StartTls => self.starttls(cmd),
            CommandBody::Login { username, password } => {
                self.login(cmd, username, password).await
            }
            CommandBody::Authenticate {
                mechanism,
                initial_response,
            } => self.authenticate(cmd, mechanism, initial_response).await,

            // Authenticated.
            CommandBody::Select { mailbox } => self.select(cmd, mailbox, false).await,
            CommandBody::Examine { mailbox } => self.select(cmd, mailbox, true).await,
            CommandBody::Create { mailbox } => self.create(cmd, mailbox).await,
            CommandBody::Delete { mailbox } => self.delete(cmd, mailbox).await,
            CommandBody::Rename { from, to } => self.rename(cmd, from, to).await,
            CommandBody::Subscribe { mailbox } => self.subscribe(cmd, mailbox, true).await,
            CommandBody::Unsubscribe { mailbox } => self.subscribe(cmd, mailbox, false).await,
            CommandBody::List {
                reference,
                mailbox_wildcard,
            } => self.list(cmd, reference, mailbox_wildcard, false).await,
            CommandBody::Lsub {
                reference,
                mailbox_wildcard,
            } => self.list(cmd, reference, mailbox_wildcard, true).await,
            CommandBody::Status {
                mailbox,
                item_names,
            } => self.status(cmd, mailbox, item_names).await,
            CommandBody::Append {
                mailbox,
                flags,
                date,
                message,
            } => self.append(cmd, mailbox, flags, date, message).await,
            CommandBody::Namespace => self.namespace(cmd),
            CommandBody::GetAcl { mailbox } => self.getacl(cmd, mailbox).await,
            CommandBody::SetAcl {
                mailbox,
                identifier,
                modification,
            } => self.setacl(cmd, mailbox, identifier, modification).await,

            // Selected.
            CommandBody::Check => cmd.ok(None),
            CommandBody::Close => self.close(cmd).await,
            CommandBody::Unselect => self.unselect(cmd),
            CommandBody::Expunge => self.expunge(cmd, None).await,
            CommandBody::ExpungeUid { sequence_set } => {
                self.expunge(cmd, Some(sequence_set)).await
            }
            CommandBody::Search {
                charset,
                criteria,
                uid,
            } => self.search(cmd, charset, criteria, uid).await,
            CommandBody::Fetch {
                sequence_set,
                macro_or_item_names,
                changed_since,
                uid,
            } => {
                self.fetch(cmd, sequence_set, macro_or_item_names, changed_since, uid)
                    .await
            }
            CommandBody::Store {
                sequence_set,
                kind,
                response,
                flags,
                unchanged_since,
                uid,
            } => {
                self.store(cmd, sequence_set, kind, response, flags, unchanged_since, uid)
                    .await
            }
            CommandBody::Copy {
                sequence_set,
                mailbox,
                uid,
            } => self.copy(cmd, sequence_set, mailbox, uid).await,
            CommandBody::Idle => self.idle(cmd),
        }
    }

    // ----- STARTTLS ----------------------------------------------------------------------------

    /// Swaps the byte stream for a TLS stream. Bytes the client pipelined
    /// after the STARTTLS command are fed into the handshake, never parsed
    /// as IMAP.
    async fn interpose_tls(&mut self) -> std::io::Result<()> {
        // Safety: `starttls` only schedules the action when an acceptor is
        // configured.
        let acceptor = self.engine.tls.clone().unwrap();

        let leftover = self.framer.take_unparsed();
        self.framer.skip_message();

        let stream = std::mem::replace(&mut self.stream, MaybeTls::Detached);

        match stream.start_tls(&acceptor, leftover).await {
            Ok(stream) => {
                self.stream = stream;
                self.tls_active = true;
                info!("TLS established");
                Ok(())
            }
            Err(error) => {
                warn!("TLS handshake failed: {error}");
                Err(error)
            }
        }
    }
}

/// Waits for the next change event of the selected mailbox; pending forever
/// when nothing is selected.
async fn next_session_event(session: &mut Option<Session>) -> Option<ChangeEvent> {
    match session.as_mut() {
        Some(session) => session.next_event().await,
        None => std::future::pending().await,
    }
}

/// Splits a raw command line into tag and (normalized) command name, without
/// parsing arguments. `UID` merges with its sub-command.
fn preparse(raw: &[u8]) -> Result<(Tag, String), ()> {
    let mut words = raw
        .split(|byte| *byte == b' ')
        .map(|word| word.strip_suffix(b"\r\n").unwrap_or(word));

    let tag = Tag::try_from(words.next().ok_or(())?).map_err(|_| ())?;

    let name = words.next().filter(|word| !word.is_empty()).ok_or(())?;
    let mut name = String::from_utf8(name.to_vec())
        .map_err(|_| ())?
        .to_ascii_uppercase();

    if name == "UID" {
        let sub = words.next().filter(|word| !word.is_empty()).ok_or(())?;
        name.push(' ');
        name.push_str(
            String::from_utf8(sub.to_vec())
                .map_err(|_| ())?
                .to_ascii_uppercase()
                .as_str(),
        );
    }

    Ok((tag, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preparse() {
        let (tag, name) = preparse(b"A001 CAPABILITY\r\n").unwrap();
        assert_eq!(tag.as_ref(), "A001");
        assert_eq!(name, "CAPABILITY");

        let (_, name) = preparse(b"a uid fetch 1 FLAGS\r\n").unwrap();
        assert_eq!(name, "UID FETCH");

        assert!(preparse(b"\r\n").is_err());
        assert!(preparse(b"only-tag\r\n").is_err());
    }
}
