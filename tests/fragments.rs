//! Property tests for continuation routing.

use bytes::Bytes;
use proptest::prelude::*;
use wsgate::{Payload, RawFrame, Role};
use wsgate_testing::SessionHarness;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

/// Feed `first` followed by continuations carrying `chunks`, the last one
/// final, and collect the delivered payloads.
fn deliver(first: RawFrame, chunks: &[Vec<u8>]) -> Vec<Payload> {
    runtime().block_on(async {
        let mut session = SessionHarness::spawn(Role::Server);
        session.frame(first).await;
        for (i, chunk) in chunks.iter().enumerate() {
            let fin = i + 1 == chunks.len();
            session
                .frame(RawFrame::continuation(fin, chunk.clone()))
                .await;
        }
        let mut payloads = Vec::with_capacity(chunks.len() + 1);
        for _ in 0..=chunks.len() {
            payloads.push(session.next_payload().await);
        }
        payloads
    })
}

proptest! {
    #[test]
    fn text_continuations_stay_text(
        head in "[a-z]{0,8}",
        tail in proptest::collection::vec("[a-zA-Z0-9 ]{0,16}", 1..8),
    ) {
        let chunks: Vec<Vec<u8>> = tail.iter().map(|s| s.clone().into_bytes()).collect();
        let payloads = deliver(RawFrame::text(head.clone()).with_fin(false), &chunks);

        let mut expected = vec![Payload::Text { text: head, final_fragment: false }];
        for (i, text) in tail.iter().enumerate() {
            expected.push(Payload::Text {
                text: text.clone(),
                final_fragment: i + 1 == tail.len(),
            });
        }
        prop_assert_eq!(payloads, expected);
    }

    #[test]
    fn binary_continuations_stay_binary(
        head in proptest::collection::vec(any::<u8>(), 0..16),
        tail in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 1..8),
    ) {
        let payloads = deliver(RawFrame::binary(head.clone()).with_fin(false), &tail);

        prop_assert_eq!(payloads.len(), tail.len() + 1);
        prop_assert_eq!(
            &payloads[0],
            &Payload::Binary { data: Bytes::from(head), final_fragment: false }
        );
        for (i, (payload, chunk)) in payloads[1..].iter().zip(&tail).enumerate() {
            prop_assert_eq!(
                payload,
                &Payload::Binary {
                    data: Bytes::from(chunk.clone()),
                    final_fragment: i + 1 == tail.len(),
                }
            );
        }
    }

    #[test]
    fn multibyte_text_split_anywhere_reassembles(
        text in "[a-zé€😀]{1,12}",
        split in any::<proptest::sample::Index>(),
    ) {
        let bytes = text.as_bytes();
        let at = split.index(bytes.len() + 1);
        let first = RawFrame::new(0x1, false, Bytes::copy_from_slice(&bytes[..at]));
        let payloads = deliver(first, &[bytes[at..].to_vec()]);

        let joined: String = payloads
            .iter()
            .map(|p| match p {
                Payload::Text { text, .. } => text.as_str(),
                other => panic!("expected text, got {other:?}"),
            })
            .collect();
        prop_assert_eq!(joined, text);
    }
}
