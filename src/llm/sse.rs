use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::TextStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Splits a server-sent-event byte stream into `data:` payloads. Bytes are
/// buffered until a full line arrives so multi-byte characters survive chunk
/// boundaries.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    match data {
        "" => None,
        "[DONE]" => Some(SseEvent::Done),
        data => Some(SseEvent::Data(data.to_string())),
    }
}

/// Pulls text out of one decoded JSON event. `Ok(None)` means the event carries
/// no text (role headers, finish markers).
pub type TextExtractor = fn(&Value) -> Result<Option<String>>;

/// Forwards the text of each event through a channel until the body ends, a
/// `[DONE]` marker arrives, or the receiver is dropped.
pub fn spawn_text_stream<S, B, E>(body: S, extract: TextExtractor) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<Result<String>>(64);

    tokio::spawn(async move {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let err: anyhow::Error = err.into();
                    let _ = sender.send(Err(err.context("model stream interrupted"))).await;
                    return;
                }
            };

            for event in decoder.push(chunk.as_ref()) {
                if !forward(&sender, event, extract).await {
                    return;
                }
            }
        }

        if let Some(event) = decoder.finish() {
            forward(&sender, event, extract).await;
        }
    });

    Box::pin(ReceiverStream::new(receiver))
}

/// Returns false when the stream should stop.
async fn forward(
    sender: &mpsc::Sender<Result<String>>,
    event: SseEvent,
    extract: TextExtractor,
) -> bool {
    let data = match event {
        SseEvent::Done => return false,
        SseEvent::Data(data) => data,
    };

    let text = serde_json::from_str::<Value>(&data)
        .context("failed to decode model stream event")
        .and_then(|value| extract(&value));

    match text {
        Ok(Some(text)) if !text.is_empty() => sender.send(Ok(text)).await.is_ok(),
        Ok(_) => true,
        Err(err) => {
            let _ = sender.send(Err(err)).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn content(value: &Value) -> Result<Option<String>> {
        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            anyhow::bail!("{message}");
        }
        Ok(value["t"].as_str().map(str::to_string))
    }

    #[test]
    fn decoder_waits_for_full_lines() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: {\"t\":\"ação\"}\n\n".as_bytes();
        // split inside a multi-byte character
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(
            decoder.push(&bytes[split..]),
            vec![SseEvent::Data("{\"t\":\"ação\"}".to_string())]
        );
    }

    #[test]
    fn decoder_ignores_comments_and_handles_crlf() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\r\nevent: message\r\ndata: {}\r\n\r\ndata: [DONE]\r\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{}".to_string()), SseEvent::Done]
        );
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn stream_stops_at_done() {
        let body = stream::iter(vec![
            Ok::<_, anyhow::Error>(b"data: {\"t\":\"Ol\"}\n\ndata: {\"t\":\"".to_vec()),
            Ok(b"\xc3\xa1\"}\n\ndata: {}\n\ndata: [DONE]\n\ndata: {\"t\":\"late\"}\n".to_vec()),
        ]);

        let chunks: Vec<String> = spawn_text_stream(body, content)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["Ol".to_string(), "á".to_string()]);
    }

    #[tokio::test]
    async fn error_event_ends_stream_with_error() {
        let body = stream::iter(vec![Ok::<_, anyhow::Error>(
            b"data: {\"t\":\"a\"}\ndata: {\"error\":\"rate limited\"}\ndata: {\"t\":\"b\"}\n".to_vec(),
        )]);

        let items: Vec<Result<String>> = spawn_text_stream(body, content).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(items[1]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("rate limited"));
    }

    #[tokio::test]
    async fn transport_error_is_forwarded() {
        let body = stream::iter(vec![
            Ok(b"data: {\"t\":\"a\"}\n".to_vec()),
            Err(anyhow::anyhow!("connection reset")),
        ]);

        let items: Vec<Result<String>> = spawn_text_stream(body, content).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_flushed() {
        let body = stream::iter(vec![Ok::<_, anyhow::Error>(b"data: {\"t\":\"fim\"}".to_vec())]);

        let chunks: Vec<String> = spawn_text_stream(body, content)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["fim".to_string()]);
    }
}
