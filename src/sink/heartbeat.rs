//! Client lease renewal
//!
//! A sink keeps its lease alive by sending `CLIENT_HEARTBEAT` requests on a
//! socket of its own, separate from the one used for application RPCs. At
//! most one heartbeat is in flight; the reply decides when the next one goes
//! out:
//!
//! ```text
//! accepted (lease L)   next = sent_at + L / 3
//! rejected / garbage   next = now + retry delay
//! no reply in timeout  socket dropped, next = now (immediately)
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tokio::time::Instant;

use crate::client::SequenceCounter;
use crate::protocol::message::ClientHeartbeatRep;
use crate::protocol::packet::{self, opcode, status, CommonPacket, PacketType};
use crate::registry::ClientInfo;
use crate::transport::{Endpoint, Multipart, ReqSocket};

/// When to send the next heartbeat. Pure timing, no I/O.
#[derive(Debug, Clone)]
pub struct HeartbeatSchedule {
    sent_at: Option<Instant>,
    next_send: Option<Instant>,
    reply_timeout: Duration,
    retry_delay: Duration,
}

impl HeartbeatSchedule {
    pub fn new(reply_timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            sent_at: None,
            next_send: None,
            reply_timeout,
            retry_delay,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.sent_at.is_some()
    }

    /// Scheduled time of the next request; `None` means as soon as possible
    pub fn next_send(&self) -> Option<Instant> {
        self.next_send
    }

    /// Whether a new request should go out at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        !self.in_flight() && self.next_send.map_or(true, |at| now >= at)
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.sent_at = Some(now);
        self.next_send = None;
    }

    /// Record the reply to the in-flight request. `lease` is the granted
    /// lease in seconds, or `None` if the reply was not an acceptance.
    pub fn reply_received(&mut self, now: Instant, lease: Option<u32>) {
        let Some(sent_at) = self.sent_at.take() else {
            return;
        };
        self.next_send = Some(match lease {
            Some(lease) => sent_at + Duration::from_millis(u64::from(lease) * 1000 / 3),
            None => now + self.retry_delay,
        });
    }

    /// Give up on the in-flight request if it has waited too long.
    ///
    /// Returns true when the request was abandoned; the next one is due
    /// immediately.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        match self.sent_at {
            Some(sent_at) if now.saturating_duration_since(sent_at) >= self.reply_timeout => {
                self.abandon();
                true
            }
            _ => false,
        }
    }

    /// Forget the in-flight request and send again immediately
    pub fn abandon(&mut self) {
        self.sent_at = None;
        self.next_send = None;
    }
}

/// Extract the granted lease from a heartbeat reply
fn granted_lease(parts: Multipart) -> Option<u32> {
    let (reply, _) = packet::decode(parts).ok()?;
    if reply.kind() != Some(PacketType::Reply)
        || reply.code() != opcode::CLIENT_HEARTBEAT
        || reply.status() != status::OK
    {
        tracing::debug!(
            code = reply.code(),
            status = reply.status(),
            info = reply.info(),
            "Heartbeat rejected"
        );
        return None;
    }
    reply
        .decode_body::<ClientHeartbeatRep>()
        .ok()
        .map(|rep| rep.lease)
}

/// Heartbeat socket plus its schedule, driven by the sink worker
pub struct LeaseRenewer {
    endpoint: Endpoint,
    socket: Option<ReqSocket>,
    schedule: HeartbeatSchedule,
    seq: Arc<SequenceCounter>,
}

impl LeaseRenewer {
    pub fn new(endpoint: Endpoint, seq: Arc<SequenceCounter>, schedule: HeartbeatSchedule) -> Self {
        Self {
            endpoint,
            socket: None,
            schedule,
            seq,
        }
    }

    pub fn schedule(&self) -> &HeartbeatSchedule {
        &self.schedule
    }

    /// Collect a pending reply, abandon a stale request, then send a new
    /// heartbeat if one is due.
    pub fn tick(&mut self, now: Instant, client: &ClientInfo) {
        if self.schedule.in_flight() {
            self.poll_reply(now);
        }
        if self.schedule.is_due(now) {
            self.send(now, client);
        }
    }

    fn poll_reply(&mut self, now: Instant) {
        let polled = match self.socket.as_mut() {
            Some(socket) => socket.try_recv(),
            None => Ok(None),
        };
        match polled {
            Ok(Some(parts)) => {
                let lease = granted_lease(parts);
                tracing::trace!(lease = ?lease, "Heartbeat reply");
                self.schedule.reply_received(now, lease);
            }
            Ok(None) => {
                if self.schedule.check_timeout(now) {
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        "Heartbeat reply timed out, resetting socket"
                    );
                    self.socket = None;
                }
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Heartbeat socket failed");
                self.socket = None;
                self.schedule.abandon();
            }
        }
    }

    fn send(&mut self, now: Instant, client: &ClientInfo) {
        let request = CommonPacket::request(
            opcode::CLIENT_HEARTBEAT,
            self.seq.next(),
            Bytes::from(client.to_msg().encode_to_vec()),
        );
        let socket = self
            .socket
            .get_or_insert_with(|| ReqSocket::connect(self.endpoint.clone()));
        match socket.send(packet::encode(&request, None)) {
            Ok(()) => {
                tracing::trace!(seq = request.seq(), client = %client, "Heartbeat sent");
                self.schedule.mark_sent(now);
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Heartbeat send failed");
                self.socket = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RepSocket;

    fn schedule() -> HeartbeatSchedule {
        HeartbeatSchedule::new(Duration::from_millis(3000), Duration::from_millis(5000))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_heartbeat_is_due_immediately() {
        let s = schedule();
        assert!(s.is_due(Instant::now()));
        assert!(!s.in_flight());
    }

    #[test]
    fn test_granted_lease_schedules_a_third() {
        let t0 = Instant::now();
        let mut s = schedule();
        s.mark_sent(t0);
        assert!(!s.is_due(t0));

        s.reply_received(t0 + ms(40), Some(15));
        assert_eq!(s.next_send(), Some(t0 + ms(5000)));
        assert!(!s.is_due(t0 + ms(4999)));
        assert!(s.is_due(t0 + ms(5000)));
    }

    #[test]
    fn test_rejection_waits_retry_delay() {
        let t0 = Instant::now();
        let mut s = schedule();
        s.mark_sent(t0);
        s.reply_received(t0 + ms(100), None);

        assert_eq!(s.next_send(), Some(t0 + ms(5100)));
        assert!(!s.in_flight());
    }

    #[test]
    fn test_timeout_resends_immediately() {
        let t0 = Instant::now();
        let mut s = schedule();
        s.mark_sent(t0);

        assert!(!s.check_timeout(t0 + ms(2999)));
        assert!(s.in_flight());
        assert!(s.check_timeout(t0 + ms(3000)));
        assert!(!s.in_flight());
        assert!(s.is_due(t0 + ms(3000)));
    }

    #[test]
    fn test_stray_reply_ignored() {
        let t0 = Instant::now();
        let mut s = schedule();
        s.reply_received(t0, Some(15));
        assert_eq!(s.next_send(), None);
    }

    #[test]
    fn test_granted_lease_parsing() {
        let body = Bytes::from(ClientHeartbeatRep { timestamp: 1, lease: 9 }.encode_to_vec());
        let ok = CommonPacket::reply(opcode::CLIENT_HEARTBEAT, 3, status::OK, "", body.clone());
        assert_eq!(granted_lease(packet::encode(&ok, None)), Some(9));

        let full = CommonPacket::reply(
            opcode::CLIENT_HEARTBEAT,
            3,
            status::BAD_REQUEST,
            "full",
            body.clone(),
        );
        assert_eq!(granted_lease(packet::encode(&full, None)), None);

        let other = CommonPacket::reply(opcode::METADATA, 3, status::OK, "", body);
        assert_eq!(granted_lease(packet::encode(&other, None)), None);

        assert_eq!(granted_lease(vec![Bytes::from_static(b"\xff\xff")]), None);
    }

    #[tokio::test]
    async fn test_renewer_reconnects_after_lost_reply() {
        let endpoint = Endpoint::ipc(std::env::temp_dir().join(format!(
            "stsw-heartbeat-{}",
            std::process::id()
        )));
        let mut rep = RepSocket::new();
        rep.bind(&endpoint).await.unwrap();

        let client = ClientInfo::new("test");
        let mut renewer = LeaseRenewer::new(
            endpoint.clone(),
            Arc::new(SequenceCounter::new()),
            schedule(),
        );

        let t0 = Instant::now();
        renewer.tick(t0, &client);
        assert!(renewer.schedule().in_flight());

        // swallow the first heartbeat
        let wait = Duration::from_secs(5);
        let (first_peer, first) = tokio::time::timeout(wait, rep.recv()).await.unwrap().unwrap();
        let (first, _) = packet::decode(first).unwrap();
        assert_eq!(first.code(), opcode::CLIENT_HEARTBEAT);

        renewer.tick(t0 + ms(2999), &client);
        assert!(renewer.schedule().in_flight());

        let t1 = t0 + ms(3000);
        renewer.tick(t1, &client);
        assert!(renewer.schedule().in_flight());

        let (second_peer, second) = tokio::time::timeout(wait, rep.recv()).await.unwrap().unwrap();
        assert_ne!(second_peer, first_peer);
        let (second, _) = packet::decode(second).unwrap();
        assert_ne!(second.seq(), first.seq());

        let body = Bytes::from(ClientHeartbeatRep { timestamp: 1, lease: 15 }.encode_to_vec());
        let reply = CommonPacket::reply_to(&second, status::OK, "", body);
        rep.send(second_peer, packet::encode(&reply, None)).unwrap();

        tokio::time::timeout(wait, async {
            while renewer.schedule().in_flight() {
                tokio::time::sleep(ms(10)).await;
                renewer.tick(t1, &client);
            }
        })
        .await
        .unwrap();
        assert_eq!(renewer.schedule().next_send(), Some(t1 + ms(5000)));
    }
}
