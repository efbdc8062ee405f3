use tokio::sync::mpsc;

/// Incremental output a turn produces before its terminal reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of model output, in generation order.
    Token(String),
    /// Sent once, right before a tool is invoked.
    ToolCall { agent: &'static str, tool: String },
}

/// Sending half of a turn's event stream. A disabled sink drops everything.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    pub fn token(&self, fragment: &str) {
        if !fragment.is_empty() {
            self.emit(StreamEvent::Token(fragment.to_string()));
        }
    }

    pub fn tool_call(&self, agent: &'static str, tool: &str) {
        self.emit(StreamEvent::ToolCall { agent, tool: tool.to_string() });
    }

    // A closed receiver means the client went away; the turn keeps running.
    fn emit(&self, event: StreamEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventSink, StreamEvent};

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (sink, mut receiver) = EventSink::channel();
        sink.token("Hel");
        sink.token("");
        sink.token("lo");
        sink.tool_call("awx_worker_agent", "list_api_paths");
        drop(sink);

        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Hel".to_string()),
                StreamEvent::Token("lo".to_string()),
                StreamEvent::ToolCall {
                    agent: "awx_worker_agent",
                    tool: "list_api_paths".to_string()
                },
            ]
        );
    }

    #[test]
    fn dropped_receiver_does_not_fail_sender() {
        let (sink, receiver) = EventSink::channel();
        drop(receiver);
        sink.token("still fine");
        assert!(!sink.is_enabled());
        assert!(!EventSink::disabled().is_enabled());
    }
}
