use ferry_core::{EnqueueOptions, OperationKind, SyncQueue};

use crate::commands::common::parse_payload;
use crate::commands::flush::report_pass;
use crate::error::CliError;

pub struct EnqueueArgs<'a> {
    pub kind: &'a str,
    pub payload: Option<&'a str>,
    pub priority: Option<i32>,
    pub scope: Option<&'a str>,
    pub immediate: bool,
}

pub async fn run_enqueue(queue: &SyncQueue, args: EnqueueArgs<'_>) -> Result<(), CliError> {
    let kind: OperationKind = args.kind.parse()?;
    let payload = parse_payload(args.payload)?;

    // The process exits right after this command, so delivery runs in the
    // foreground instead of on a spawned pass.
    let mut options = EnqueueOptions::new().deferred();
    if let Some(priority) = args.priority {
        options = options.priority(priority);
    }
    if let Some(scope) = args.scope {
        options = options.scope(scope);
    }

    let id = queue.enqueue(kind, payload, options)?;
    println!("{id}");

    if !queue.is_online() {
        println!("{}", kind.offline_message());
    } else if args.immediate {
        report_pass(queue.flush().await)?;
    }
    Ok(())
}
