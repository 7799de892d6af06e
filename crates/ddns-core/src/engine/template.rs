//! Update URL templates
//!
//! Target URLs carry named placeholders filled in per attempt:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{token}` | decrypted provider token |
//! | `{hostname}` | target hostname |
//! | `{id}` | target id |
//! | `{ip}` | current public IP, empty when unknown |
//!
//! `{{` and `}}` produce literal braces. Any other brace usage (an unknown
//! name, a format spec such as `{ip:>15}`, an unmatched brace) makes the
//! whole template unrenderable, and the literal template is used instead.

/// Values available to a template
#[derive(Clone, Copy)]
pub struct UpdateUrlValues<'a> {
    pub token: &'a str,
    pub hostname: &'a str,
    pub id: &'a str,
    /// Empty when the IP is unknown
    pub ip: &'a str,
}

impl<'a> UpdateUrlValues<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "token" => Some(self.token),
            "hostname" => Some(self.hostname),
            "id" => Some(self.id),
            "ip" => Some(self.ip),
            _ => None,
        }
    }
}

/// Substitute placeholders, falling back to the literal template
///
/// Values are inserted verbatim. The result may contain the token: callers
/// must never log it.
pub fn render_update_url(template: &str, values: &UpdateUrlValues<'_>) -> String {
    try_render(template, values).unwrap_or_else(|| template.to_string())
}

fn try_render(template: &str, values: &UpdateUrlValues<'_>) -> Option<String> {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let brace = &rest[pos..];

        if brace.starts_with("{{") {
            out.push('{');
            rest = &brace[2..];
        } else if brace.starts_with("}}") {
            out.push('}');
            rest = &brace[2..];
        } else if brace.starts_with('}') {
            return None;
        } else {
            let close = brace.find('}')?;
            let name = &brace[1..close];
            out.push_str(values.lookup(name)?);
            rest = &brace[close + 1..];
        }
    }

    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> UpdateUrlValues<'static> {
        UpdateUrlValues {
            token: "tok3n",
            hostname: "www",
            id: "7",
            ip: "198.51.100.7",
        }
    }

    #[test]
    fn substitutes_all_placeholders() {
        let url = render_update_url(
            "https://dyn.example.com/update?host={hostname}&password={token}&ip={ip}&t={id}",
            &values(),
        );
        assert_eq!(
            url,
            "https://dyn.example.com/update?host=www&password=tok3n&ip=198.51.100.7&t=7"
        );
    }

    #[test]
    fn placeholders_may_repeat_or_be_absent() {
        assert_eq!(
            render_update_url("https://a.example/{id}/{id}", &values()),
            "https://a.example/7/7"
        );
        assert_eq!(
            render_update_url("https://a.example/fixed", &values()),
            "https://a.example/fixed"
        );
    }

    #[test]
    fn unknown_ip_renders_empty() {
        let values = UpdateUrlValues { ip: "", ..values() };
        assert_eq!(
            render_update_url("https://a.example/?ip={ip}&h={hostname}", &values),
            "https://a.example/?ip=&h=www"
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        assert_eq!(
            render_update_url("https://a.example/{{x}}/{hostname}", &values()),
            "https://a.example/{x}/www"
        );
    }

    #[test]
    fn unrenderable_templates_stay_literal() {
        for template in [
            "https://a.example/?d={domain}&h={hostname}",
            "https://a.example/?ip={ip:>15}",
            "https://a.example/?h={hostname",
            "https://a.example/?h=hostname}",
            "https://a.example/?x={}",
        ] {
            assert_eq!(render_update_url(template, &values()), template);
        }
    }
}
