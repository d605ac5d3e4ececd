//! Protocol-id negotiation and malformed input tests.

#[cfg(test)]
mod tests {
    use blockswap_core::metrics::names;
    use blockswap_engine::server::NOT_AVAILABLE;
    use blockswap_engine::{Connection, ProcessorConfig, VarintFrameCodec};
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    use crate::{MemorySource, TestServer};

    #[tokio::test]
    async fn test_should_refuse_unknown_protocol() {
        let server = TestServer::start(MemorySource::default(), ProcessorConfig::default()).await;

        let stream = TcpStream::connect(server.addr).await.unwrap();
        let mut framed = Framed::new(stream, VarintFrameCodec::new(1024));
        framed
            .send(Bytes::from_static(b"/ipfs/bitswap/2.0.0"))
            .await
            .unwrap();

        assert_eq!(
            framed.next().await.unwrap().unwrap(),
            Bytes::from_static(NOT_AVAILABLE)
        );
        assert!(framed.next().await.is_none());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_close_on_undecodable_wantlist() {
        let server = TestServer::start(MemorySource::default(), ProcessorConfig::default()).await;

        let conn = server.connect(blockswap_protocol::ProtocolVersion::V120).await;
        conn.send(Bytes::from_static(&[0x0a, 0xff, 0xff])).await.unwrap();
        assert!(!matches!(conn.receive().await, Some(Ok(_))));

        let metrics = server.metrics.clone();
        server.shutdown().await;
        assert_eq!(metrics.value(names::INVALID_MESSAGES), 1);
        assert_eq!(metrics.value(names::ACTIVE_CONNECTIONS), 0);
    }

    #[tokio::test]
    async fn test_should_reject_oversized_inbound_frame() {
        let config = ProcessorConfig::builder().max_message_size(64).build();
        let server = TestServer::start(MemorySource::default(), config).await;

        let conn = server.connect(blockswap_protocol::ProtocolVersion::V110).await;
        conn.send(Bytes::from(vec![0u8; 128])).await.unwrap();
        assert!(!matches!(conn.receive().await, Some(Ok(_))));

        let metrics = server.metrics.clone();
        server.shutdown().await;
        assert_eq!(metrics.value(names::INVALID_MESSAGES), 1);
    }
}
