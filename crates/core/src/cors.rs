//! Local-origin check for the transport layer: the control plane only
//! accepts connections whose `Origin` header (when present) names a loopback
//! host or the desktop shell's custom scheme.

pub fn check_local_origin(origin: &str) -> bool {
    if origin.is_empty() {
        return true;
    }
    if origin == "wails://wails" {
        return true;
    }
    let Some((scheme, rest)) = origin.split_once("://") else {
        return false;
    };
    if scheme != "http" && scheme != "https" {
        return false;
    }
    let host_port = rest.split('/').next().unwrap_or("");
    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or("")
    } else {
        host_port.split(':').next().unwrap_or("")
    };
    match host {
        "localhost" | "127.0.0.1" => true,
        // unlike the other two loopback forms, [::1] is only allowed over
        // plain http: no https://[::1] origin is ever issued by the shell.
        "::1" => scheme == "http",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_empty_loopback_and_desktop_origins() {
        assert!(check_local_origin(""));
        assert!(check_local_origin("http://localhost"));
        assert!(check_local_origin("http://localhost:3000"));
        assert!(check_local_origin("https://127.0.0.1"));
        assert!(check_local_origin("http://[::1]:8080"));
        assert!(check_local_origin("wails://wails"));
    }

    #[test]
    fn rejects_remote_origins() {
        assert!(!check_local_origin("http://evil.com"));
        assert!(!check_local_origin("https://127.0.0.1.evil.com"));
        assert!(!check_local_origin("ftp://localhost"));
    }

    #[test]
    fn rejects_https_for_ipv6_loopback() {
        assert!(!check_local_origin("https://[::1]"));
        assert!(!check_local_origin("https://[::1]:8080"));
    }
}
