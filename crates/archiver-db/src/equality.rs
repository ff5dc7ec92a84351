//! "Same as latest" equality, including media-URL normalization on
//! message embeds so a re-observed embed whose CDN signature refreshed
//! is not treated as a new snapshot.

use archiver_core::ObjectKind;
use serde_json::Value;

/// Known CDN hosts whose query string carries a signature rather than
/// identity — stripped before comparing embed URLs for equality.
const SIGNED_CDN_HOSTS: &[&str] = &["media.discordapp.net", "cdn.discordapp.com"];

pub(crate) fn normalize_extras_for_equality(kind: ObjectKind, extras: Option<&Value>) -> Option<Value> {
    let extras = extras?;
    if kind != ObjectKind::Message {
        return Some(extras.clone());
    }
    let mut normalized = extras.clone();
    if let Some(embeds) = normalized.get_mut("embeds").and_then(Value::as_array_mut) {
        for embed in embeds {
            strip_signature_urls(embed);
        }
    }
    Some(normalized)
}

fn strip_signature_urls(embed: &mut Value) {
    const URL_FIELDS: &[&str] = &["url", "proxy_url"];
    const NESTED: &[&str] = &["image", "thumbnail", "video", "footer"];
    if let Some(obj) = embed.as_object_mut() {
        for field in URL_FIELDS {
            if let Some(Value::String(url)) = obj.get_mut(*field) {
                *url = strip_query_if_signed_cdn(url);
            }
        }
        for nested_key in NESTED {
            if let Some(nested) = obj.get_mut(*nested_key) {
                strip_signature_urls(nested);
            }
        }
    }
}

fn strip_query_if_signed_cdn(url: &str) -> String {
    let Some((base, _query)) = url.split_once('?') else {
        return url.to_string();
    };
    let is_signed_cdn = SIGNED_CDN_HOSTS.iter().any(|host| base.contains(host));
    if is_signed_cdn { base.to_string() } else { url.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_urls_on_known_cdn_hosts_are_normalized() {
        let extras = serde_json::json!({
            "embeds": [{ "url": "https://media.discordapp.net/a.png?ex=1&hm=2" }]
        });
        let normalized = normalize_extras_for_equality(ObjectKind::Message, Some(&extras)).unwrap();
        assert_eq!(normalized["embeds"][0]["url"], serde_json::json!("https://media.discordapp.net/a.png"));
    }

    #[test]
    fn unrelated_urls_are_left_alone() {
        let extras = serde_json::json!({
            "embeds": [{ "url": "https://example.com/a.png?v=1" }]
        });
        let normalized = normalize_extras_for_equality(ObjectKind::Message, Some(&extras)).unwrap();
        assert_eq!(normalized["embeds"][0]["url"], serde_json::json!("https://example.com/a.png?v=1"));
    }

    #[test]
    fn non_message_extras_pass_through_unchanged() {
        let extras = serde_json::json!({ "premium_tier": 2 });
        let normalized = normalize_extras_for_equality(ObjectKind::Server, Some(&extras)).unwrap();
        assert_eq!(normalized, extras);
    }
}
