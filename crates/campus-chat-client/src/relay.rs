//! HTTP client for the `/api/chat` relay routes.

use bytes::Bytes;
use campus_chat_types::{
    ChatMessage, ChatRequest, ChatResponse, ClearResponse, ErrorBody, HistoryResponse, SseStep,
    StreamEvent, sse_items,
};
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, Url};
use serde_json::from_str;
use tracing::debug;

use crate::error::ClientError;

/// Reply events of one streamed send. Ends after the first terminal event.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ClientError>>;

/// Client for one relay deployment.
#[derive(Debug, Clone)]
pub struct RelayClient {
    base: Url,
    http: Client,
}

impl RelayClient {
    /// `base_url` is the site root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_owned()));
        }
        let http = Client::builder()
            .user_agent(concat!("campus-chat-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, http })
    }

    /// `{base}/api/chat/{tail...}`, with each tail segment percent-encoded.
    fn endpoint(&self, tail: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "chat"])
            .extend(tail);
        Ok(url)
    }

    /// `POST /api/chat`: wait for the whole reply.
    pub async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let resp = self.http.post(self.endpoint(&[])?).json(req).send().await?;
        decode(check(resp).await?).await
    }

    /// `POST /api/chat/stream`: reply events as they arrive.
    pub async fn send_stream(&self, req: &ChatRequest) -> Result<EventStream, ClientError> {
        let resp = self
            .http
            .post(self.endpoint(&["stream"])?)
            .header(ACCEPT, "text/event-stream")
            .json(req)
            .send()
            .await?;
        Ok(events(check(resp).await?.bytes_stream()))
    }

    /// `GET /api/chat/{session_id}`.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>, ClientError> {
        let resp = self.http.get(self.endpoint(&[session_id])?).send().await?;
        let body: HistoryResponse = decode(check(resp).await?).await?;
        Ok(body.messages)
    }

    /// `DELETE /api/chat/{session_id}`.
    pub async fn clear(&self, session_id: &str) -> Result<(), ClientError> {
        let resp = self.http.delete(self.endpoint(&[session_id])?).send().await?;
        let body: ClearResponse = decode(check(resp).await?).await?;
        if body.success {
            Ok(())
        } else {
            Err(ClientError::Decode("relay did not confirm the clear".into()))
        }
    }
}

async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = from_str::<ErrorBody>(&text).map(|b| b.error).unwrap_or(text);
    debug!(status = status.as_u16(), %message, "relay rejected request");
    Err(ClientError::Status { status: status.as_u16(), message })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))
}

fn events<S>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    sse_items(bytes, |data: &str| match from_str::<StreamEvent>(data) {
        Ok(event) if event.is_terminal() => SseStep::Last(event),
        Ok(event) => SseStep::Item(event),
        Err(e) => SseStep::Fail(ClientError::Decode(e.to_string())),
    })
    .boxed()
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::stream;

    fn bytes_of(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        let owned: Vec<Result<Bytes, reqwest::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        stream::iter(owned)
    }

    #[test]
    fn endpoints_hang_off_the_base_url() {
        let relay = RelayClient::new("http://localhost:3000").unwrap();
        assert_eq!(relay.endpoint(&[]).unwrap().as_str(), "http://localhost:3000/api/chat");
        assert_eq!(
            relay.endpoint(&["stream"]).unwrap().as_str(),
            "http://localhost:3000/api/chat/stream"
        );

        let prefixed = RelayClient::new("https://campus.example/site/").unwrap();
        assert_eq!(
            prefixed.endpoint(&["s1"]).unwrap().as_str(),
            "https://campus.example/site/api/chat/s1"
        );
    }

    #[test]
    fn session_ids_are_percent_encoded() {
        let relay = RelayClient::new("http://localhost:3000").unwrap();
        assert_eq!(
            relay.endpoint(&["a b/c"]).unwrap().as_str(),
            "http://localhost:3000/api/chat/a%20b%2Fc"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(RelayClient::new("not a url"), Err(ClientError::InvalidUrl(_))));
        assert!(matches!(RelayClient::new("mailto:desk@campus.example"), Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn events_decode_across_reads_and_stop_at_terminal() {
        let body = bytes_of(&[
            "data: {\"chunk\":\"Hel\"}\n\nda",
            "ta: {\"chunk\":\"lo\"}\n\n",
            "data: {\"done\":true,\"fullResponse\":\"Hello\"}\n\n",
            "data: {\"chunk\":\"late\"}\n\n",
        ]);
        let got: Vec<StreamEvent> = events(body).map(|r| r.unwrap()).collect().await;
        assert_eq!(
            got,
            vec![StreamEvent::chunk("Hel"), StreamEvent::chunk("lo"), StreamEvent::done("Hello")]
        );
    }

    #[tokio::test]
    async fn events_report_garbage_as_decode_errors() {
        let got: Vec<_> = events(bytes_of(&["data: <html>\n\n"])).collect().await;
        assert!(matches!(got.as_slice(), [Err(ClientError::Decode(_))]));
    }
}
