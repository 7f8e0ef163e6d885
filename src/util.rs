use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const HUB_PORT: &str = "ENERGY_HUB_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(HUB_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const HUB_ADDR: &str = "ENERGY_HUB_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(HUB_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

pub fn get_bind_addr() -> SocketAddr {
    SocketAddr::new(get_addr(), get_port())
}

const HUB_TOKEN: &str = "ENERGY_HUB_TOKEN";

pub fn get_token() -> Option<String> {
    let token_from_env = std::env::var(HUB_TOKEN);
    token_from_env.ok().filter(|token| !token.is_empty())
}

/// Convert an `http(s)://` base URL into the matching `ws(s)://` stream URL
pub fn stream_url(api_url: &str) -> String {
    let ws_url = api_url
        .trim_end_matches('/')
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    format!("{ws_url}/api/v1/stream")
}
