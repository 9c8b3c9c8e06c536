//! Provider/configurator/consumer URL parsing and construction.
//!
//! ZooKeeper child names are percent-encoded Dubbo URLs
//! (`dubbo://1.2.3.4:20880/com.example.Svc?group=g&version=1.0`). This
//! module turns a raw child name into a structured [`ProviderUrl`], and
//! builds the consumer URL this process registers under.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::BTreeMap;

use crate::error::DubboResult;

/// A parsed provider or configurator URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUrl {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub fields: BTreeMap<String, String>,
}

impl ProviderUrl {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Percent-decode a ZooKeeper child name and parse it as a Dubbo URL.
///
/// `url::Url` handles generic (non-special) schemes like `dubbo://` fine:
/// the authority between `//` and the next `/` is still parsed as a host,
/// and the query string still splits into pairs.
pub fn parse_provider_url(child_name: &str) -> DubboResult<ProviderUrl> {
    let decoded = percent_decode_str(child_name)
        .decode_utf8()
        .map_err(|e| crate::error::DubboError::register(format!("invalid percent-encoding in znode name: {e}")))?;
    let parsed = url::Url::parse(&decoded)?;

    let host = match (parsed.host_str(), parsed.port()) {
        (Some(h), Some(p)) => format!("{h}:{p}"),
        (Some(h), None) => h.to_string(),
        (None, _) => String::new(),
    };

    let fields: BTreeMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok(ProviderUrl {
        scheme: parsed.scheme().to_string(),
        host,
        path: parsed.path().to_string(),
        fields,
    })
}

const CONSUMER_URL_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Build the `consumer://` URL string (unencoded) for registering this
/// process against `provider_path`, carrying the subset of the first
/// provider's fields copied onto this process's consumer node.
pub fn build_consumer_url(
    local_ip: &str,
    provider_path: &str,
    fields: &BTreeMap<String, String>,
) -> String {
    let params: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("consumer://{local_ip}{provider_path}?{}", params.join("&"))
}

/// Percent-encode a consumer URL for use as a znode name.
pub fn encode_znode_name(consumer_url: &str) -> String {
    utf8_percent_encode(consumer_url, CONSUMER_URL_ENCODE).to_string()
}

/// This process's primary outbound IP address, used to build the
/// consumer URL. Opens a UDP socket toward a well-known public address
/// without sending any traffic, then reads back the local address the
/// kernel would route through — the standard no-traffic trick for
/// discovering "the" local IP on a multi-homed host.
pub fn local_ip() -> DubboResult<String> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dubbo_provider_url() {
        let raw = "dubbo%3A%2F%2F10.0.0.5%3A20880%2Fcom.example.Svc%3Fgroup%3Dg%26version%3D1.0";
        let parsed = parse_provider_url(raw).unwrap();
        assert_eq!(parsed.scheme, "dubbo");
        assert_eq!(parsed.host, "10.0.0.5:20880");
        assert_eq!(parsed.path, "/com.example.Svc");
        assert_eq!(parsed.field("group"), Some("g"));
        assert_eq!(parsed.field("version"), Some("1.0"));
    }

    #[test]
    fn test_parse_rejects_non_dubbo_scheme_is_caller_concern() {
        // Parsing itself doesn't filter by scheme; the registry does.
        let raw = "override%3A%2F%2F0.0.0.0%2Fcom.example.Svc";
        let parsed = parse_provider_url(raw).unwrap();
        assert_eq!(parsed.scheme, "override");
    }

    #[test]
    fn test_build_and_encode_consumer_url() {
        let mut fields = BTreeMap::new();
        fields.insert("application".to_string(), "my-app".to_string());
        fields.insert("category".to_string(), "consumers".to_string());
        let url = build_consumer_url("10.0.0.9", "/com.example.Svc", &fields);
        assert_eq!(
            url,
            "consumer://10.0.0.9/com.example.Svc?application=my-app&category=consumers"
        );
        let encoded = encode_znode_name(&url);
        assert!(!encoded.contains("://"));
        assert!(encoded.contains("consumer%3A%2F%2F"));
    }
}
