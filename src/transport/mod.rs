//! Message-oriented socket transport
//!
//! A small set of socket patterns built on tokio streams:
//!
//! - [`RepSocket`] / [`ReqSocket`]: request/reply with strict alternation
//!   on the requesting side and peer-routed replies on the serving side
//! - [`PubSocket`] / [`SubSocket`]: topic-prefix fan-out with a bounded
//!   queue (high-water mark) per subscriber; excess messages are dropped
//!
//! Every message is a [`Multipart`]: an ordered list of byte frames carried
//! atomically by [`MultipartCodec`]. Endpoints are `tcp://host:port` or
//! `ipc:///path/to/socket`.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod publish;
pub mod rep;
pub mod req;
pub mod subscribe;

use bytes::Bytes;

pub use codec::MultipartCodec;
pub use endpoint::Endpoint;
pub use error::TransportError;
pub use publish::PubSocket;
pub use rep::RepSocket;
pub use req::ReqSocket;
pub use subscribe::SubSocket;

/// One atomic message made of several frames
pub type Multipart = Vec<Bytes>;

/// Recover the guard of a poisoned mutex
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn temp_endpoint(name: &str) -> Endpoint {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        Endpoint::ipc(std::env::temp_dir().join(format!(
            "stsw-transport-{}-{}-{}",
            std::process::id(),
            n,
            name
        )))
    }

    #[tokio::test]
    async fn test_request_reply() {
        let endpoint = temp_endpoint("rep");
        let mut rep = RepSocket::new();
        rep.bind(&endpoint).await.unwrap();

        let mut req = ReqSocket::connect(endpoint.clone());
        req.send(vec![Bytes::from_static(b"ping"), Bytes::from_static(b"blob")])
            .unwrap();
        assert!(matches!(
            req.send(vec![Bytes::new()]),
            Err(TransportError::InvalidState)
        ));

        let (peer, request) = rep.recv().await.unwrap();
        assert_eq!(request.len(), 2);
        assert_eq!(&request[0][..], b"ping");
        rep.send(peer, vec![Bytes::from_static(b"pong")]).unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), req.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&reply[0][..], b"pong");
        assert!(!req.is_pending());
    }

    #[tokio::test]
    async fn test_ipc_address_in_use() {
        let endpoint = temp_endpoint("busy");
        let mut first = RepSocket::new();
        first.bind(&endpoint).await.unwrap();

        let mut second = RepSocket::new();
        assert!(matches!(
            second.bind(&endpoint).await,
            Err(TransportError::AddrInUse(_))
        ));

        drop(first);
        assert!(!endpoint.ipc_path().unwrap().exists());
        second.bind(&endpoint).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_filters_by_topic() {
        let endpoint = temp_endpoint("pub");
        let mut publisher = PubSocket::new(16);
        publisher.bind(&endpoint).await.unwrap();

        let mut media =
            SubSocket::connect(endpoint.clone(), vec![Bytes::from_static(b"media")], 16);
        let mut everything = SubSocket::connect(endpoint.clone(), vec![Bytes::new()], 16);

        tokio::time::timeout(Duration::from_secs(5), async {
            while publisher.subscriber_count() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(publisher.send(vec![Bytes::from_static(b"info"), Bytes::from_static(b"1")]), 1);
        assert_eq!(publisher.send(vec![Bytes::from_static(b"media"), Bytes::from_static(b"2")]), 2);

        let got = tokio::time::timeout(Duration::from_secs(5), media.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&got[1][..], b"2");

        let first = everything.recv().await.unwrap();
        let second = everything.recv().await.unwrap();
        assert_eq!(&first[1][..], b"1");
        assert_eq!(&second[1][..], b"2");
    }

    #[tokio::test]
    async fn test_publish_drops_when_queue_full() {
        let endpoint = temp_endpoint("hwm");
        let mut publisher = PubSocket::new(2);
        publisher.bind(&endpoint).await.unwrap();

        let _slow = SubSocket::connect(endpoint.clone(), vec![Bytes::new()], 2);
        tokio::time::timeout(Duration::from_secs(5), async {
            while publisher.subscriber_count() < 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        // the writer task cannot drain while this task holds the thread
        let delivered: usize = (0..10)
            .map(|_| publisher.send(vec![Bytes::from_static(b"x")]))
            .sum();
        assert_eq!(delivered, 2);
    }
}
