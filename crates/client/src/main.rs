//! pawtalk-tail - connect to the messaging socket and print every frame.
//!
//! Reads the token from `PAWTALK_TOKEN`, falling back to the stored one.

use anyhow::{bail, Context, Result};
use pawtalk_client::ws::{ComponentSession, MountOptions, TokenSource};
use pawtalk_client::{ClientConfig, Connection, Topic};
use pawtalk_shared::Frame;

#[tokio::main]
async fn main() -> Result<()> {
    pawtalk_client::logging::init("pawtalk_client=info,pawtalk_tail=info");

    let config = ClientConfig::from_env();
    let token = match std::env::var("PAWTALK_TOKEN") {
        Ok(token) if !token.trim().is_empty() => token,
        _ => config
            .token_source()
            .token()
            .with_context(|| format!("no PAWTALK_TOKEN and nothing stored under '{}'", config.token_key))?,
    };

    let endpoint = config
        .runtime
        .socket_origin()
        .context("invalid socket endpoint")?;
    tracing::info!("Tailing {}", endpoint);

    let connection = Connection::tungstenite(config.connection());
    let mut session = ComponentSession::mount(
        &connection,
        "tail",
        &move || Some(token.clone()),
        MountOptions::default(),
    );
    session.subscribe(Topic::Any, |frame: &Frame| match frame {
        Frame::Ping => tracing::debug!("ping"),
        Frame::Message {
            kind,
            data,
            conversation_id,
        } => match conversation_id {
            Some(id) => println!("[{kind}] conversation {id}: {data}"),
            None => println!("[{kind}] {data}"),
        },
    });

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                break;
            }
            state = session.changed() => {
                let Some(state) = state else {
                    bail!("connection dropped");
                };
                tracing::info!("Connection {:?}", state);
            }
        }
    }

    session.unmount();
    connection.disconnect();
    Ok(())
}
