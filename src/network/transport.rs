use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc::{self, Receiver, Sender},
    task::JoinHandle,
};
use tracing::{debug, error, warn};

use super::message::Envelope;
use crate::common::error::Result;

/// Decodes one envelope per input line. Lines that fail to decode are logged
/// and skipped. The channel closes at end of input.
pub fn spawn_reader<R>(input: R, capacity: usize) -> (Receiver<Envelope>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(input).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "failed to read input");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match Envelope::decode(&line) {
                Ok(envelope) => {
                    if tx.send(envelope).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, line = %line, "skipping malformed input"),
            }
        }
        debug!("input closed");
    });
    (rx, handle)
}

/// Encodes every envelope sent on the returned channel as one output line.
/// The task ends once all senders are dropped.
pub fn spawn_writer<W>(output: W, capacity: usize) -> (Sender<Envelope>, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Envelope>(capacity);
    let handle = tokio::spawn(async move {
        let mut output = output;
        while let Some(envelope) = rx.recv().await {
            let mut line = match envelope.encode() {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, dest = %envelope.dest, "dropping unencodable envelope");
                    continue;
                }
            };
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok(())
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::network::message::{Body, NodeId, Payload};

    #[tokio::test]
    async fn test_reader_skips_malformed_lines() {
        let input = concat!(
            r#"{"src":"c1","dest":"n1","body":{"type":"read","msg_id":1}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"src":"c1","dest":"n1","body":{"type":"unknown_type","msg_id":2}}"#,
            "\n",
            r#"{"src":"c1","dest":"n1","body":{"type":"echo","echo":"x","msg_id":3}}"#,
            "\n",
        );
        let (mut rx, handle) = spawn_reader(Cursor::new(input.as_bytes().to_vec()), 8);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.body.payload, Payload::Read);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.body.msg_id, Some(3));
        assert!(rx.recv().await.is_none());

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_emits_lines() {
        let (client, server) = tokio::io::duplex(4096);
        let (tx, handle) = spawn_writer(client, 8);

        for msg_id in [1, 2] {
            tx.send(Envelope::new(
                NodeId::from("n1"),
                NodeId::from("c1"),
                Body::request(Payload::Read, msg_id),
            ))
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap().unwrap();

        let mut lines = BufReader::new(server).lines();
        let first = Envelope::decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second = Envelope::decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.body.msg_id, Some(1));
        assert_eq!(second.body.msg_id, Some(2));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
