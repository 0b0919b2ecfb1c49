//! Inbound routing
//!
//! Background frames go to the background handler. Command responses go
//! to the handler registered for their command, else to the default one.

use shared::message::{InboundKind, InboundMessage, WsCommand};
use std::collections::HashMap;
use std::sync::Arc;

pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

#[derive(Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<WsCommand, MessageHandler>,
    default: Option<MessageHandler>,
    background: Option<MessageHandler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, command: WsCommand, handler: MessageHandler) {
        self.handlers.insert(command, handler);
    }

    pub fn remove(&mut self, command: &WsCommand) -> bool {
        self.handlers.remove(command).is_some()
    }

    pub fn set_default(&mut self, handler: MessageHandler) {
        self.default = Some(handler);
    }

    pub fn set_background(&mut self, handler: MessageHandler) {
        self.background = Some(handler);
    }

    /// Handler for `msg`, if any
    pub fn resolve(&self, msg: &InboundMessage) -> Option<MessageHandler> {
        match msg.kind {
            InboundKind::Background => self.background.clone(),
            InboundKind::CommandResponse => msg
                .command
                .as_ref()
                .and_then(|cmd| self.handlers.get(cmd))
                .or(self.default.as_ref())
                .cloned(),
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .field("has_default", &self.default.is_some())
            .field("has_background", &self.background.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, MessageHandler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (
            hits,
            Arc::new(move |_: &InboundMessage| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_specific_then_default() {
        let (entry_hits, entry) = counter();
        let (default_hits, default) = counter();
        let mut table = DispatchTable::new();
        table.set(WsCommand::Entry, entry);
        table.set_default(default);

        let msg = InboundMessage::parse(r#"{"cmd":"entry"}"#).unwrap();
        table.resolve(&msg).unwrap()(&msg);
        let msg = InboundMessage::parse(r#"{"cmd":"top_scores"}"#).unwrap();
        table.resolve(&msg).unwrap()(&msg);

        assert_eq!(entry_hits.load(Ordering::SeqCst), 1);
        assert_eq!(default_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_background_not_sent_to_default() {
        let (default_hits, default) = counter();
        let mut table = DispatchTable::new();
        table.set_default(default);

        let msg = InboundMessage::parse(r#"{"cmd":"coins","data":{}}"#).unwrap();
        assert!(table.resolve(&msg).is_none());
        assert_eq!(default_hits.load(Ordering::SeqCst), 0);

        let (bg_hits, bg) = counter();
        table.set_background(bg);
        table.resolve(&msg).unwrap()(&msg);
        assert_eq!(bg_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove() {
        let (_, h) = counter();
        let mut table = DispatchTable::new();
        table.set(WsCommand::Heartbeat, h);
        assert!(table.remove(&WsCommand::Heartbeat));
        assert!(!table.remove(&WsCommand::Heartbeat));
    }
}
