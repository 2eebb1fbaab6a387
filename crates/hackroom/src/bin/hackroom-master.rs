//! The master tier: room registry behind an RPC endpoint.

use hackroom::prelude::*;

#[tokio::main]
async fn main() -> Result<(), HackroomError> {
    hackroom::init_tracing();

    let config = MasterConfig::load()?;
    let gateway = WebSocketGateway::new(config.room_host.clone()).with_timeout(config.call_timeout());
    tracing::info!(
        listen = %config.listen_addr,
        runtime = ?config.runtime,
        start = config.ports.start,
        end = config.ports.end,
        "hackroom master starting"
    );

    match config.runtime {
        RuntimeKind::Process => {
            let runtime = CommandRuntime::new(config.room_program.clone())
                .with_bind_host(config.room_host.clone())
                .with_envs(config.room_env());
            serve(&config, runtime, gateway).await
        }
        RuntimeKind::InProcess => {
            let runtime =
                InProcessRuntime::new(config.engine.clone()).with_bind_host(config.room_host.clone());
            serve(&config, runtime, gateway).await
        }
    }
}

async fn serve<R: ProcessRuntime>(
    config: &MasterConfig,
    runtime: R,
    gateway: WebSocketGateway,
) -> Result<(), HackroomError> {
    let registry = RoomRegistry::start(config.registry_config(), runtime, gateway).await?;
    let server = RpcServer::builder()
        .bind(&config.listen_addr)
        .build(MasterService::new(registry))
        .await?;
    server.run().await
}
