use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::ofp_datapath::Datapath;
use crate::ofp_dispatch::{Application, EchoRequestHandler};
use crate::openflow0x04::Message;

/// Answers echo requests, keeping switches that probe liveness connected.
#[derive(Debug, Default)]
pub struct EchoResponder;

#[async_trait]
impl EchoRequestHandler for EchoResponder {
    async fn handle_echo_request(&self, xid: u32, data: &[u8], dp: &Arc<Datapath>) {
        if let Err(e) = dp.reply(xid, Message::EchoReply(data.to_vec())).await {
            debug!(xid, "echo reply not sent: {}", e);
        }
    }
}

impl Application for EchoResponder {
    fn name(&self) -> &str {
        "echo"
    }

    fn as_echo_request_handler(&self) -> Option<&dyn EchoRequestHandler> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofp_datapath::Outbound;

    #[tokio::test]
    async fn echoes_payload_under_request_xid() {
        let (dp, mut rx) = Datapath::channel("127.0.0.1:6653".parse().unwrap(), 2);
        EchoResponder.handle_echo_request(41, b"ping", &dp).await;
        match rx.try_recv().unwrap() {
            Outbound::Message { xid, message } => {
                assert_eq!(xid, 41);
                assert_eq!(message, Message::EchoReply(b"ping".to_vec()));
            }
            Outbound::Close => panic!("unexpected close"),
        }
    }
}
