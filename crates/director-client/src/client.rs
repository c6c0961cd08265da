//! `GameClient`: one game's connection to the director.

use std::collections::BTreeMap;

use director_core::envelope::{CommandKind, ContextData, ForceData, InvokeData, ResultData};
use director_core::{Action, Envelope, InvocationId, OutboundQueue};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::errors::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A director message the game has to react to.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    /// Execute an action and report back with [`GameClient::send_result`].
    Invoke(InvokeData),
    /// The director asked for the full catalogue; it has already been re-sent.
    ReregisterAll,
    /// Anything else, passed through untouched.
    Other(Envelope),
}

/// Game-side connection to the director.
pub struct GameClient {
    game: String,
    ws: WsStream,
    outbound: OutboundQueue<()>,
    registered: BTreeMap<String, Action>,
}

impl GameClient {
    /// Connect to `url` and announce `game` with a handshake.
    pub async fn connect(url: &str, game: impl Into<String>) -> Result<Self, ClientError> {
        let game = game.into();
        let (ws, _response) = connect_async(url).await?;
        let mut client = Self {
            game,
            ws,
            outbound: OutboundQueue::new(),
            registered: BTreeMap::new(),
        };
        client.send(Envelope::handshake(&client.game)).await?;
        info!(game = %client.game, url, "connected to director");
        Ok(client)
    }

    /// Game name this client announced.
    pub fn game(&self) -> &str {
        &self.game
    }

    /// Actions the client believes are registered, sorted by name.
    pub fn registered(&self) -> Vec<&Action> {
        self.registered.values().collect()
    }

    /// Buffer a `register` for `actions`. Sent on the next [`flush`](Self::flush).
    pub fn register_actions(&mut self, actions: Vec<Action>) {
        if actions.is_empty() {
            return;
        }
        let _ = self
            .outbound
            .enqueue((), Envelope::register(&self.game, &actions));
        for action in actions {
            let _ = self.registered.insert(action.name.clone(), action);
        }
    }

    /// Buffer an `unregister` for `names`. Sent on the next [`flush`](Self::flush).
    pub fn unregister_actions(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let _ = self
            .outbound
            .enqueue((), Envelope::unregister(&self.game, names));
        for name in names {
            let _ = self.registered.remove(name);
        }
    }

    /// Send everything buffered, in order. Returns how many envelopes went out.
    pub async fn flush(&mut self) -> Result<usize, ClientError> {
        let pending = self.outbound.drain(&());
        let count = pending.len();
        for envelope in pending {
            self.send(envelope).await?;
        }
        Ok(count)
    }

    /// Report the outcome of an invocation.
    pub async fn send_result(
        &mut self,
        id: InvocationId,
        success: bool,
        message: Option<String>,
    ) -> Result<(), ClientError> {
        let result = ResultData {
            id,
            success,
            message,
        };
        self.send_ordered(Envelope::result(&self.game, &result)).await
    }

    /// Tell the director what is happening in the game.
    pub async fn send_context(&mut self, context: &ContextData) -> Result<(), ClientError> {
        self.send_ordered(Envelope::context(&self.game, &context.message, context.silent))
            .await
    }

    /// Ask the director to pick one of `force.action_names` and invoke it.
    pub async fn force_actions(&mut self, force: &ForceData) -> Result<(), ClientError> {
        self.send_ordered(Envelope::force(&self.game, force)).await
    }

    /// Wait for the next director message.
    ///
    /// Returns `Ok(None)` once the director closes the connection. A
    /// `reregister_all` is answered before it is returned.
    pub async fn next_message(&mut self) -> Result<Option<Incoming>, ClientError> {
        loop {
            let text = match self.ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(err.into()),
            };

            let envelope = match Envelope::decode(text.as_str()) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(game = %self.game, error = %err, "dropping malformed director message");
                    continue;
                }
            };

            return match envelope.kind() {
                CommandKind::Invoke => Ok(Some(Incoming::Invoke(envelope.payload()?))),
                CommandKind::ReregisterAll => {
                    self.reregister_all().await?;
                    Ok(Some(Incoming::ReregisterAll))
                }
                _ => Ok(Some(Incoming::Other(envelope))),
            };
        }
    }

    /// Close the socket.
    pub async fn close(mut self) -> Result<(), ClientError> {
        let _ = self.flush().await?;
        self.ws.close(None).await?;
        Ok(())
    }

    async fn reregister_all(&mut self) -> Result<(), ClientError> {
        let actions: Vec<Action> = self.registered.values().cloned().collect();
        debug!(game = %self.game, count = actions.len(), "re-registering catalogue");
        if !actions.is_empty() {
            let _ = self
                .outbound
                .enqueue((), Envelope::register(&self.game, &actions));
        }
        let _ = self.flush().await?;
        Ok(())
    }

    async fn send_ordered(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        let _ = self.outbound.enqueue((), envelope);
        let _ = self.flush().await?;
        Ok(())
    }

    async fn send(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        let text = envelope.encode()?;
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use director_core::commands;
    use director_core::envelope::{RegisterData, UnregisterData};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    type ServerSide = WebSocketStream<TcpStream>;

    async fn pair(game: &str) -> (GameClient, ServerSide) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_async(stream).await.unwrap()
        });
        let client = GameClient::connect(&url, game).await.unwrap();
        (client, accept.await.unwrap())
    }

    async fn recv(server: &mut ServerSide) -> Envelope {
        loop {
            if let Message::Text(text) = server.next().await.unwrap().unwrap() {
                return Envelope::decode(text.as_str()).unwrap();
            }
        }
    }

    async fn push(server: &mut ServerSide, envelope: &Envelope) {
        server
            .send(Message::Text(envelope.encode().unwrap().into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn handshake_is_sent_on_connect() {
        let (client, mut server) = pair("snake").await;
        let hello = recv(&mut server).await;
        assert_eq!(hello.command, commands::HANDSHAKE);
        assert_eq!(hello.game.as_deref(), Some("snake"));
        assert_eq!(client.game(), "snake");
    }

    #[tokio::test]
    async fn buffered_registers_coalesce_until_flush() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;

        client.register_actions(vec![Action::new("left", "")]);
        client.register_actions(vec![Action::new("right", "")]);
        client.unregister_actions(&["left".to_owned()]);
        assert_eq!(client.flush().await.unwrap(), 2);

        let register: RegisterData = recv(&mut server).await.payload().unwrap();
        let names: Vec<_> = register.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["left", "right"]);
        let unregister: UnregisterData = recv(&mut server).await.payload().unwrap();
        assert_eq!(unregister.action_names, vec!["left".to_owned()]);

        let registered: Vec<_> = client.registered().iter().map(|a| a.name.clone()).collect();
        assert_eq!(registered, vec!["right".to_owned()]);
    }

    #[tokio::test]
    async fn redefined_action_reaches_director_as_latest_version() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;

        client.register_actions(vec![Action::new("turn", "v1"), Action::new("turn", "v2")]);
        client.register_actions(vec![Action::new("turn", "v3")]);
        assert_eq!(client.flush().await.unwrap(), 1);

        let register: RegisterData = recv(&mut server).await.payload().unwrap();
        assert_eq!(register.actions, vec![Action::new("turn", "v3")]);
        assert_eq!(client.registered()[0].description, "v3");
    }

    #[tokio::test]
    async fn reregister_all_resends_everything() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;
        client.register_actions(vec![Action::new("left", ""), Action::new("right", "")]);
        let _ = client.flush().await.unwrap();
        let _ = recv(&mut server).await;

        push(&mut server, &Envelope::reregister_all()).await;
        assert_eq!(client.next_message().await.unwrap(), Some(Incoming::ReregisterAll));

        let again = recv(&mut server).await;
        assert_eq!(again.command, commands::REGISTER);
        let register: RegisterData = again.payload().unwrap();
        assert_eq!(register.actions.len(), 2);
    }

    #[tokio::test]
    async fn invoke_then_result() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;

        let invoke = InvokeData {
            id: InvocationId::from("inv-1"),
            name: "left".into(),
            data: Some("{\"steps\":2}".into()),
        };
        push(&mut server, &Envelope::invoke(&invoke)).await;
        let Some(Incoming::Invoke(received)) = client.next_message().await.unwrap() else {
            panic!("expected an invoke");
        };
        assert_eq!(received, invoke);

        client
            .send_result(received.id, false, Some("wall".into()))
            .await
            .unwrap();
        let result: ResultData = recv(&mut server).await.payload().unwrap();
        assert_eq!(result.id.as_str(), "inv-1");
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("wall"));
    }

    #[tokio::test]
    async fn result_flushes_pending_mutations_first() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;

        client.register_actions(vec![Action::new("left", "")]);
        client
            .send_context(&ContextData {
                message: "level 2".into(),
                silent: true,
            })
            .await
            .unwrap();

        assert_eq!(recv(&mut server).await.command, commands::REGISTER);
        let context = recv(&mut server).await;
        assert_eq!(context.command, commands::CONTEXT);
        assert_eq!(context.data.unwrap()["silent"], json!(true));
    }

    #[tokio::test]
    async fn unknown_and_malformed_messages() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;

        server.send(Message::Text("not json".into())).await.unwrap();
        push(&mut server, &Envelope::new("action/hint")).await;
        let next = client.next_message().await.unwrap();
        assert_eq!(next, Some(Incoming::Other(Envelope::new("action/hint"))));
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;
        server.close(None).await.unwrap();
        assert_eq!(client.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn force_carries_candidates() {
        let (mut client, mut server) = pair("snake").await;
        let _ = recv(&mut server).await;
        let force = ForceData {
            query: "move".into(),
            action_names: vec!["left".into(), "right".into()],
            ..ForceData::default()
        };
        client.force_actions(&force).await.unwrap();
        let sent: ForceData = recv(&mut server).await.payload().unwrap();
        assert_eq!(sent, force);
    }
}
