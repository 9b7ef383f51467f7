//! Wi-Fi driver loop: executes [`RadioCommand`]s against the controller and
//! reports link changes back through [`RadioShared`].

use core::net::Ipv4Addr;

use embassy_futures::select::{Either, select};
use embassy_net::{ConfigV4, Ipv4Cidr, Stack, StaticConfigV4};
use esp_radio::wifi::{
    AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, WifiController, WifiEvent,
};
use inktag_core::connect::{NetworkEvent, StaticIp};
use inktag_hal_esp32s3::network::{RadioCommand, RadioShared};
use log::{info, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LinkMode {
    Off,
    /// Associated, waiting for an IPv4 configuration.
    Joining,
    Joined,
    /// Station left the network; waits for a command.
    Lost,
    AccessPoint,
}

pub fn access_point_config(address: Ipv4Addr, prefix_len: u8) -> embassy_net::Config {
    embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(address, prefix_len),
        gateway: Some(address),
        dns_servers: Default::default(),
    })
}

pub async fn radio_loop(
    mut controller: WifiController<'_>,
    sta: Stack<'_>,
    ap: Stack<'_>,
    shared: &'static RadioShared,
) -> ! {
    let mut mode = LinkMode::Off;

    loop {
        let command = match select(
            shared.next_command(),
            watch(&mut controller, mode, sta, shared),
        )
        .await
        {
            Either::First(command) => command,
            Either::Second(next) => {
                mode = next;
                continue;
            }
        };

        mode = apply(&mut controller, sta, ap, shared, command).await;
    }
}

async fn watch(
    controller: &mut WifiController<'_>,
    mode: LinkMode,
    sta: Stack<'_>,
    shared: &'static RadioShared,
) -> LinkMode {
    match mode {
        LinkMode::Joining => {
            sta.wait_config_up().await;
            let address = sta.config_v4().map(|config| config.address.address());
            info!("wifi: station address {:?}", address);
            shared.set_address(address);
            shared.post_event(NetworkEvent::StationGotAddress);
            LinkMode::Joined
        }
        LinkMode::Joined => {
            match select(
                controller.wait_for_event(WifiEvent::StaDisconnected),
                sta.wait_config_down(),
            )
            .await
            {
                Either::First(()) => {
                    warn!("wifi: station disconnected");
                    shared.set_address(None);
                    shared.post_event(NetworkEvent::StationDisconnected);
                    LinkMode::Lost
                }
                Either::Second(()) => {
                    warn!("wifi: station address lost");
                    shared.set_address(None);
                    shared.post_event(NetworkEvent::StationLostAddress);
                    LinkMode::Joining
                }
            }
        }
        LinkMode::Off | LinkMode::Lost | LinkMode::AccessPoint => {
            core::future::pending::<LinkMode>().await
        }
    }
}

async fn apply(
    controller: &mut WifiController<'_>,
    sta: Stack<'_>,
    ap: Stack<'_>,
    shared: &'static RadioShared,
    command: RadioCommand,
) -> LinkMode {
    match command {
        RadioCommand::Station {
            hostname,
            ssid,
            password,
            static_ip,
        } => {
            info!("wifi: joining {} as {}", ssid.as_str(), hostname.as_str());
            stop(controller).await;

            let client = ClientConfig::default()
                .with_ssid(ssid.as_str().into())
                .with_password(password.as_str().into());
            if let Err(err) = controller.set_config(&ModeConfig::Client(client)) {
                warn!("wifi: station config failed: {:?}", err);
                return LinkMode::Lost;
            }
            sta.set_config_v4(station_addressing(static_ip));

            if let Err(err) = controller.start_async().await {
                warn!("wifi: start failed: {:?}", err);
                return LinkMode::Lost;
            }
            join(controller).await
        }
        RadioCommand::AccessPoint {
            ssid,
            password,
            address,
            prefix_len,
        } => {
            info!("wifi: starting access point {}", ssid.as_str());
            stop(controller).await;

            let mut config = AccessPointConfig::default().with_ssid(ssid.as_str().into());
            if let Some(password) = password {
                config = config
                    .with_password(password.as_str().into())
                    .with_auth_method(AuthMethod::Wpa2Personal);
            }
            if let Err(err) = controller.set_config(&ModeConfig::AccessPoint(config)) {
                warn!("wifi: access point config failed: {:?}", err);
                return LinkMode::Off;
            }
            ap.set_config_v4(ConfigV4::Static(StaticConfigV4 {
                address: Ipv4Cidr::new(address, prefix_len),
                gateway: Some(address),
                dns_servers: Default::default(),
            }));

            if let Err(err) = controller.start_async().await {
                warn!("wifi: access point start failed: {:?}", err);
                return LinkMode::Off;
            }
            shared.set_address(Some(address));
            shared.post_event(NetworkEvent::AccessPointStarted);
            LinkMode::AccessPoint
        }
        RadioCommand::Disconnect => {
            if let Err(err) = controller.disconnect_async().await {
                warn!("wifi: disconnect failed: {:?}", err);
            }
            shared.set_address(None);
            LinkMode::Lost
        }
        RadioCommand::Reconnect => join(controller).await,
        RadioCommand::Shutdown => {
            stop(controller).await;
            shared.set_address(None);
            LinkMode::Off
        }
    }
}

async fn join(controller: &mut WifiController<'_>) -> LinkMode {
    match controller.connect_async().await {
        Ok(()) => {
            info!("wifi: associated");
            LinkMode::Joining
        }
        Err(err) => {
            warn!("wifi: connect failed: {:?}", err);
            LinkMode::Lost
        }
    }
}

async fn stop(controller: &mut WifiController<'_>) {
    if matches!(controller.is_started(), Ok(true))
        && let Err(err) = controller.stop_async().await
    {
        warn!("wifi: stop failed: {:?}", err);
    }
}

fn station_addressing(static_ip: Option<StaticIp>) -> ConfigV4 {
    match static_ip {
        Some(ip) => {
            let mut dns_servers = heapless::Vec::new();
            if let Some(dns) = ip.dns_server() {
                let _ = dns_servers.push(dns);
            }
            ConfigV4::Static(StaticConfigV4 {
                address: Ipv4Cidr::new(ip.address, ip.prefix_len),
                gateway: Some(ip.gateway),
                dns_servers,
            })
        }
        None => ConfigV4::Dhcp(Default::default()),
    }
}
