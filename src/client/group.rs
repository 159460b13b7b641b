//! Batches of sends awaited together.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::notification::Notification;
use crate::client::Client;
use crate::connection::{Context, Delegate, Request, Response};
use crate::error::{Deadline, Error, Result, SubmissionError};
use crate::monitor::{Condition, Outcome, Registration};
use crate::threading::{mailbox, Counter, Mailbox, MailboxSender};

/// Called once with the response to a grouped request.
pub type Callback = Box<dyn FnOnce(Response, Option<Context>) + Send + 'static>;

enum GroupCommand {
    Register { id: String, callback: Callback },
    Forget { id: String },
    Deliver { response: Response, context: Option<Context> },
    Finalize,
    Stop,
}

/// Delegate handed to connections; forwards responses to the group task.
struct GroupDelegate {
    commands: MailboxSender<GroupCommand>,
}

impl Delegate for GroupDelegate {
    fn handle_response(&self, response: Response, context: Option<Context>) {
        if self.commands.send(GroupCommand::Deliver { response, context }).is_err() {
            tracing::debug!("Response arrived after its group was torn down");
        }
    }
}

/// A set of requests whose callbacks run on a dedicated delivery task.
///
/// Callbacks are keyed by correlation id and registered before the request
/// is posted. [`RequestGroup::flush`] waits until every callback has run,
/// the timeout passes, or a connection in the pool fails fatally.
pub struct RequestGroup {
    client: Client,
    commands: MailboxSender<GroupCommand>,
    delegate: Arc<dyn Delegate>,
    pending: Counter,
    finalized: Arc<AtomicBool>,
    done: Condition,
    _registration: Registration,
}

impl RequestGroup {
    pub(crate) fn new(client: Client) -> Self {
        let (commands, inbox) = mailbox();
        let pending = Counter::new();
        let finalized = Arc::new(AtomicBool::new(false));
        let done = Condition::new();
        let registration = client.monitor().register(done.clone());

        tokio::spawn(deliver(
            inbox,
            pending.clone(),
            Arc::clone(&finalized),
            done.clone(),
        ));

        Self {
            client,
            delegate: Arc::new(GroupDelegate {
                commands: commands.clone(),
            }),
            commands,
            pending,
            finalized,
            done,
            _registration: registration,
        }
    }

    /// Post `request` and run `callback` with its response.
    ///
    /// The request must carry a correlation id. Its delegate is replaced
    /// by the group's.
    pub fn send<F>(&self, request: Request, callback: F) -> Result<()>
    where
        F: FnOnce(Response, Option<Context>) + Send + 'static,
    {
        if self.finalized.load(Ordering::SeqCst) {
            return Err(SubmissionError::GroupFinalized.into());
        }
        let Some(id) = request.correlation_id().map(str::to_owned) else {
            return Err(SubmissionError::MissingCorrelationId.into());
        };

        self.pending.increment();
        let registered = self.commands.send(GroupCommand::Register {
            id: id.clone(),
            callback: Box::new(callback),
        });
        if registered.is_err() {
            self.pending.decrement();
            return Err(Error::WorkerStopped);
        }

        let request = request.with_delegate(Arc::clone(&self.delegate));
        if let Err(err) = self.client.post(request) {
            let _ = self.commands.send(GroupCommand::Forget { id });
            return Err(err);
        }
        Ok(())
    }

    /// Format and send `notification` through the group's client.
    pub fn send_notification<F>(
        &self,
        notification: &Notification,
        context: Option<Context>,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Response, Option<Context>) + Send + 'static,
    {
        let mut request = self.client.build_request(notification)?;
        if let Some(context) = context {
            request = request.with_context(context);
        }
        self.send(request, callback)
    }

    /// Callbacks still waiting for a response.
    pub fn pending(&self) -> usize {
        self.pending.value()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_zero()
    }

    /// Stop accepting sends and wait for every callback to run.
    ///
    /// Returns immediately when nothing is pending. A connection failure
    /// propagated through the monitor surfaces as [`Error::GroupWait`].
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        self.finalized.store(true, Ordering::SeqCst);
        if self.pending.is_zero() {
            self.done.finish();
            return Ok(());
        }
        let _ = self.commands.send(GroupCommand::Finalize);

        match tokio::time::timeout(timeout, self.done.wait()).await {
            Ok(Outcome::Finished) => Ok(()),
            Ok(Outcome::Failed(error)) => Err(Error::GroupWait(error)),
            Err(_) => Err(Error::TimedOut {
                deadline: Deadline::Group,
                after: timeout,
            }),
        }
    }
}

impl Drop for RequestGroup {
    fn drop(&mut self) {
        let _ = self.commands.send(GroupCommand::Stop);
    }
}

impl std::fmt::Debug for RequestGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGroup")
            .field("pending", &self.pending.value())
            .field("finalized", &self.finalized.load(Ordering::SeqCst))
            .finish()
    }
}

async fn deliver(
    mut inbox: Mailbox<GroupCommand>,
    pending: Counter,
    finalized: Arc<AtomicBool>,
    done: Condition,
) {
    let mut callbacks: HashMap<String, Callback> = HashMap::new();
    let check_done = || {
        if finalized.load(Ordering::SeqCst) && pending.is_zero() {
            done.finish();
        }
    };

    while let Some(command) = inbox.recv().await {
        match command {
            GroupCommand::Register { id, callback } => {
                if callbacks.insert(id.clone(), callback).is_some() {
                    tracing::warn!(apns_id = %id, "Duplicate id in group, earlier callback replaced");
                    pending.decrement();
                }
            }
            GroupCommand::Forget { id } => {
                callbacks.remove(&id);
                pending.decrement();
                check_done();
            }
            GroupCommand::Deliver { response, context } => {
                let callback = response.id().and_then(|id| callbacks.remove(id));
                match callback {
                    Some(callback) => {
                        let apns_id = response.id().unwrap_or("").to_owned();
                        if catch_unwind(AssertUnwindSafe(|| callback(response, context))).is_err() {
                            tracing::error!(apns_id = %apns_id, "Group callback panicked");
                        }
                        pending.decrement();
                    }
                    None => tracing::warn!(
                        apns_id = response.id().unwrap_or(""),
                        "Response for an id this group did not register"
                    ),
                }
                check_done();
            }
            GroupCommand::Finalize => check_done(),
            GroupCommand::Stop => break,
        }
    }
}
