//! Wantlist request/response tests over TCP.

#[cfg(test)]
mod tests {
    use blockswap_core::metrics::names;
    use blockswap_engine::ProcessorConfig;
    use blockswap_protocol::{BlockPresenceType, Entry, ProtocolVersion};

    use crate::{MemorySource, TestServer, cid_for};

    const HELLO: &[u8] = b"hello, blockswap";
    const WORLD: &[u8] = b"a second block of bytes";

    #[tokio::test]
    async fn test_should_serve_block_on_every_revision() {
        let server = TestServer::start(
            MemorySource::default().with_block(HELLO),
            ProcessorConfig::default(),
        )
        .await;
        let cid = cid_for(HELLO);

        for version in ProtocolVersion::ALL {
            let replies = server.request(version, vec![Entry::want_block(cid)]).await;
            assert_eq!(replies.len(), 1, "{version}");
            assert_eq!(replies[0].blocks.len(), 1, "{version}");
            assert_eq!(replies[0].blocks[0].data.as_ref(), HELLO, "{version}");
        }
        assert_eq!(server.metrics.value(names::BLOCKS_SENT), 3);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_answer_presences_on_newest_revision() {
        let server = TestServer::start(
            MemorySource::default().with_block(HELLO),
            ProcessorConfig::default(),
        )
        .await;
        let (hello, world) = (cid_for(HELLO), cid_for(WORLD));

        let replies = server
            .request(
                ProtocolVersion::V120,
                vec![
                    Entry::want_have(hello),
                    Entry::want_block(world).with_send_dont_have(true),
                ],
            )
            .await;

        let mut presences: Vec<_> = replies
            .iter()
            .flat_map(|m| m.block_presences.iter().map(|p| (p.cid, p.presence_type)))
            .collect();
        presences.sort_by_key(|(cid, _)| *cid == world);
        assert_eq!(
            presences,
            vec![
                (hello, BlockPresenceType::Have),
                (world, BlockPresenceType::DontHave),
            ]
        );
        assert!(replies.iter().all(|m| m.blocks.is_empty()));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_split_large_responses() {
        let blocks: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i; 1000]).collect();
        let source = blocks
            .iter()
            .fold(MemorySource::default(), |s, b| s.with_block(b));
        let config = ProcessorConfig::builder().max_message_size(2500).build();
        let server = TestServer::start(source, config).await;

        let entries = blocks.iter().map(|b| Entry::want_block(cid_for(b))).collect();
        let replies = server.request(ProtocolVersion::V110, entries).await;

        assert!(replies.len() >= 3);
        let total: usize = replies.iter().map(|m| m.blocks.len()).sum();
        assert_eq!(total, 6);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_not_answer_canceled_want() {
        let server = TestServer::start(
            MemorySource::default().with_block(HELLO).with_block(WORLD),
            ProcessorConfig::default(),
        )
        .await;
        let (hello, world) = (cid_for(HELLO), cid_for(WORLD));

        let replies = server
            .request(
                ProtocolVersion::V110,
                vec![
                    Entry::want_block(hello),
                    Entry::want_block(world),
                    Entry::cancel(hello),
                ],
            )
            .await;

        let cids: Vec<_> = replies
            .iter()
            .flat_map(|m| m.blocks.iter().map(|b| b.cid().unwrap()))
            .collect();
        assert_eq!(cids, vec![world]);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_should_close_quietly_when_nothing_is_found() {
        let server = TestServer::start(MemorySource::default(), ProcessorConfig::default()).await;

        let replies = server
            .request(ProtocolVersion::V100, vec![Entry::want_block(cid_for(HELLO))])
            .await;

        assert!(replies.is_empty());
        server.shutdown().await;
    }
}
