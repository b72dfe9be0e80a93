use std::path::PathBuf;
use tokio::sync::oneshot;

use crate::job::JobId;
use crate::space::SpaceCheck;

/// Low-space question sent to the host when a job's request says `Ask`.
///
/// Dropping the prompt without answering declines it.
#[derive(Debug)]
pub struct SpacePrompt {
    pub job_id: JobId,
    pub target: String,
    pub destination: PathBuf,
    pub check: SpaceCheck,
    reply: oneshot::Sender<bool>,
}

impl SpacePrompt {
    pub(super) fn new(
        job_id: JobId,
        target: String,
        destination: PathBuf,
        check: SpaceCheck,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                job_id,
                target,
                destination,
                check,
                reply,
            },
            rx,
        )
    }

    /// `true` continues the transfer anyway, `false` cancels it.
    pub fn respond(self, proceed: bool) {
        let _ = self.reply.send(proceed);
    }
}
