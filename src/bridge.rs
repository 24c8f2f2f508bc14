use crate::config::Settings;
use crate::discovery::publish_discovery;
use crate::econet::EconetClient;
use crate::error::Result;
use crate::mqtt::MqttConnection;
use crate::poller::Poller;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Process-wide context: owns the settings, the controller client and the
/// single broker connection from startup until shutdown.
pub struct Bridge {
    settings: Settings,
    source: EconetClient,
    connection: MqttConnection,
    shutdown: CancellationToken,
}

impl Bridge {
    /// Connect to the broker and publish discovery configs. Any error here is
    /// a startup failure.
    pub async fn start(settings: Settings, shutdown: CancellationToken) -> Result<Self> {
        let source = EconetClient::new(&settings)?;
        let connection = MqttConnection::connect(&settings).await?;
        publish_discovery(&settings, &connection).await?;

        Ok(Self {
            settings,
            source,
            connection,
            shutdown,
        })
    }

    /// Run the poll loop until shutdown, then close the connection.
    pub async fn run(self) -> Result<()> {
        let Bridge {
            settings,
            source,
            connection,
            shutdown,
        } = self;

        {
            let mut poller = Poller::new(&settings, &source, &connection);
            poller.run(&shutdown).await;
        }

        info!("shutting down");
        connection.close().await;
        Ok(())
    }
}
