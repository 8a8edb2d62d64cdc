//! Text rewrites applied to served content. Everything here is a pure function
//! of its inputs.

use pulldown_cmark::{html, Options, Parser};

use crate::config::PreviewTarget;

const MARKDOWN_TEMPLATE: &str = include_str!("../templates/markdown.html");
const CONSOLE_TEMPLATE: &str = include_str!("../templates/console.html");

const BRIDGE_OPEN: &str = "<!-- livepreview:bridge -->";
const BRIDGE_CLOSE: &str = "<!-- /livepreview:bridge -->";
const SCRIPT_CLOSE: &str = "></script>";

#[derive(Clone, Debug)]
pub struct BridgeParams<'a> {
    /// Session token; also the class used to find and remove the injected tags.
    pub token: &'a str,
    pub console_script: &'a str,
    pub target: PreviewTarget,
    pub show_console_toggler: bool,
}

#[derive(Clone, Debug)]
pub struct ConsoleParams<'a> {
    pub console_script: &'a str,
    pub executing_script: &'a str,
}

/// Injects the debug-console bridge into an HTML page.
///
/// The block goes right after the first `<head>` tag, into a synthesized
/// `<head>` after `<html>` when there is none, or in front of everything when
/// neither tag exists. A block left by an earlier injection is replaced, so the
/// result always carries exactly one.
pub fn inject_bridge(page: &str, params: &BridgeParams<'_>) -> String {
    let page = strip_bridge(page);
    let page = add_crossorigin(&page);
    let block = bridge_block(params);

    if let Some(at) = find_open_tag(&page, "head") {
        let mut out = String::with_capacity(page.len() + block.len());
        out.push_str(&page[..at]);
        out.push_str(&block);
        out.push_str(&page[at..]);
        return out;
    }
    if let Some(at) = find_open_tag(&page, "html") {
        let mut out = String::with_capacity(page.len() + block.len() + 13);
        out.push_str(&page[..at]);
        out.push_str("<head>");
        out.push_str(&block);
        out.push_str("</head>");
        out.push_str(&page[at..]);
        return out;
    }
    format!("<head>{block}</head>{page}")
}

pub fn render_markdown(markdown: &str, filename: &str, style_resource: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    fill(
        MARKDOWN_TEMPLATE,
        &[
            ("filename", &escape_html(filename)),
            ("style", &escape_html(style_resource)),
            ("html", &body),
        ],
    )
}

pub fn render_console_page(params: &ConsoleParams<'_>) -> String {
    fill(
        CONSOLE_TEMPLATE,
        &[
            ("console_script", &escape_html(params.console_script)),
            ("executing_script", &escape_html(params.executing_script)),
        ],
    )
}

fn bridge_block(params: &BridgeParams<'_>) -> String {
    let token = escape_html(params.token);
    let console_script = escape_html(params.console_script);
    let inapp = params.target == PreviewTarget::InApp;
    let hide_entry = if inapp {
        "eruda._shadowRoot.querySelector('.eruda-entry-btn').style.display = 'none';"
    } else {
        ""
    };
    let hide_toggler = if inapp || !params.show_console_toggler {
        "document.querySelector('c-toggler').style.display = 'none';"
    } else {
        ""
    };

    format!(
        r#"{BRIDGE_OPEN}<meta name="viewport" content="width=device-width, initial-scale=1.0" />
<script class="{token}" src="/{console_script}" crossorigin="anonymous"></script>
<script class="{token}">
  if (window.eruda) {{
    eruda.init({{ theme: 'dark' }});
    {hide_entry}
    sessionStorage.setItem('__console_available', true);
    document.addEventListener('showconsole', function () {{ eruda.show(); }});
    document.addEventListener('hideconsole', function () {{ eruda.hide(); }});
  }} else if (document.querySelector('c-toggler')) {{
    {hide_toggler}
  }}
  setTimeout(function () {{
    document.querySelectorAll('.{token}').forEach(function (el) {{
      if (el.parentNode) el.parentNode.removeChild(el);
    }});
  }}, 0);
</script>{BRIDGE_CLOSE}"#
    )
}

fn strip_bridge(page: &str) -> String {
    let mut out = String::with_capacity(page.len());
    let mut rest = page;
    while let Some(start) = rest.find(BRIDGE_OPEN) {
        let Some(len) = rest[start..].find(BRIDGE_CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + len + BRIDGE_CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

/// Marks src-only script tags `crossorigin="anonymous"` so the console sees
/// full error details for them.
fn add_crossorigin(page: &str) -> String {
    let mut out = String::with_capacity(page.len() + 64);
    let mut rest = page;
    while let Some(idx) = rest.find(SCRIPT_CLOSE) {
        let (head, tail) = rest.split_at(idx);
        let tag_start = head.rfind('<').unwrap_or(0);
        let present = head[tag_start..]
            .to_ascii_lowercase()
            .contains("crossorigin");
        out.push_str(head);
        if !present {
            out.push_str(" crossorigin=\"anonymous\"");
        }
        out.push_str(SCRIPT_CLOSE);
        rest = &tail[SCRIPT_CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

/// Byte offset just past the first `<name ...>` opening tag, case-insensitive.
fn find_open_tag(page: &str, name: &str) -> Option<usize> {
    let lower = page.to_ascii_lowercase();
    let needle = format!("<{name}");
    let mut from = 0;
    while let Some(rel) = lower[from..].find(&needle) {
        let start = from + rel;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b'>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() || *c == b'/' => {
                return lower[after..].find('>').map(|gt| after + gt + 1);
            }
            _ => from = after,
        }
    }
    None
}

/// Replaces `{{key}}` placeholders in one pass; unknown keys stay as written
/// and there are no sections or escaping.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let key = rest[open + 2..open + 2 + close].trim();
        out.push_str(&rest[..open]);
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 4]),
        }
        rest = &rest[open + close + 4..];
    }
    out.push_str(rest);
    out
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_substitutes_plain_keys_only() {
        let out = fill(
            "<{{ tag }}>{{body}}</{{tag}}>{{#list}}{{missing}}",
            &[("tag", "p"), ("body", "{{tag}}")],
        );
        assert_eq!(out, "<p>{{tag}}</p>{{#list}}{{missing}}");
    }

    fn params(token: &str) -> BridgeParams<'_> {
        BridgeParams {
            token,
            console_script: "abc_console.js",
            target: PreviewTarget::Browser,
            show_console_toggler: true,
        }
    }

    #[test]
    fn injects_right_after_head() {
        let page = "<!DOCTYPE html><html><head><title>t</title></head><body></body></html>";
        let out = inject_bridge(page, &params("abc"));
        let head_end = out.find("<head>").unwrap() + "<head>".len();
        assert!(out[head_end..].starts_with(BRIDGE_OPEN));
        assert_eq!(out.matches(BRIDGE_OPEN).count(), 1);
        assert_eq!(out.matches("<head>").count(), 1);
        assert!(out.contains(r#"<script class="abc" src="/abc_console.js" crossorigin="anonymous"></script>"#));
        assert!(out.ends_with("<title>t</title></head><body></body></html>"));
    }

    #[test]
    fn only_the_first_head_receives_the_block() {
        let page = "<html><head></head><body><pre>&lt;head&gt;</pre><template><head></head></template></body></html>";
        let out = inject_bridge(page, &params("abc"));
        assert_eq!(out.matches(BRIDGE_OPEN).count(), 1);
        assert!(out.starts_with(&format!("<html><head>{BRIDGE_OPEN}")));
    }

    #[test]
    fn synthesizes_head_after_html_tag() {
        let page = "<HTML lang=\"en\"><body>hi</body></HTML>";
        let out = inject_bridge(page, &params("abc"));
        assert!(out.starts_with(&format!("<HTML lang=\"en\"><head>{BRIDGE_OPEN}")));
        assert_eq!(out.matches("<head>").count(), 1);
        assert_eq!(out.matches("</head>").count(), 1);
        assert!(out.ends_with("</head><body>hi</body></HTML>"));
    }

    #[test]
    fn prepends_head_when_there_is_no_document_skeleton() {
        let out = inject_bridge("<p>bare</p>", &params("abc"));
        assert!(out.starts_with(&format!("<head>{BRIDGE_OPEN}")));
        assert!(out.ends_with("</head><p>bare</p>"));
    }

    #[test]
    fn header_elements_are_not_mistaken_for_head() {
        let out = inject_bridge("<header>x</header>", &params("abc"));
        assert!(out.starts_with("<head>"));
        assert!(out.ends_with("</head><header>x</header>"));
    }

    #[test]
    fn injection_is_referentially_pure() {
        let page = "<html><head></head><body><script src=\"a.js\"></script></body></html>";
        assert_eq!(
            inject_bridge(page, &params("abc")),
            inject_bridge(page, &params("abc"))
        );
    }

    #[test]
    fn reinjecting_replaces_the_previous_block() {
        let page = "<html><head></head><body></body></html>";
        let first = inject_bridge(page, &params("first"));
        let second = inject_bridge(&first, &params("second"));
        assert_eq!(second.matches(BRIDGE_OPEN).count(), 1);
        assert!(!second.contains("class=\"first\""));
        assert!(second.contains("class=\"second\""));
        assert_eq!(second, inject_bridge(page, &params("second")));
    }

    #[test]
    fn page_scripts_gain_crossorigin_once() {
        let page = "<head></head><script src=\"a.js\"></script><script src=\"b.js\" crossorigin=\"use-credentials\"></script>";
        let out = inject_bridge(page, &params("abc"));
        assert!(out.contains(r#"<script src="a.js" crossorigin="anonymous"></script>"#));
        assert!(out.contains(r#"<script src="b.js" crossorigin="use-credentials"></script>"#));
    }

    #[test]
    fn inapp_target_hides_console_controls() {
        let inapp = BridgeParams {
            target: PreviewTarget::InApp,
            ..params("abc")
        };
        let out = inject_bridge("<head></head>", &inapp);
        assert!(out.contains(".eruda-entry-btn').style.display = 'none'"));
        assert!(out.contains("querySelector('c-toggler').style.display = 'none'"));

        let browser = inject_bridge("<head></head>", &params("abc"));
        assert!(!browser.contains("style.display = 'none'"));

        let no_toggler = BridgeParams {
            show_console_toggler: false,
            ..params("abc")
        };
        let out = inject_bridge("<head></head>", &no_toggler);
        assert!(!out.contains(".eruda-entry-btn"));
        assert!(out.contains("querySelector('c-toggler').style.display = 'none'"));
    }

    #[test]
    fn markdown_page_links_session_stylesheet() {
        let out = render_markdown("# Hello\n\n| a | b |\n|---|---|\n| 1 | 2 |\n", "notes <1>.md", "abc_md.css");
        assert!(out.contains("<h1>Hello</h1>"));
        assert!(out.contains("<table>"));
        assert!(out.contains(r#"<link rel="stylesheet" href="/abc_md.css" />"#));
        assert!(out.contains("<title>notes &lt;1&gt;.md</title>"));
    }

    #[test]
    fn template_values_are_not_expanded_twice() {
        let out = render_markdown("{{style}}", "a.md", "abc_md.css");
        assert!(out.contains("<p>{{style}}</p>"));
    }

    #[test]
    fn console_page_references_both_scripts() {
        let out = render_console_page(&ConsoleParams {
            console_script: "abc_console.js",
            executing_script: "main.js",
        });
        assert!(out.contains(r#"<script src="/abc_console.js"></script>"#));
        assert!(out.contains(r#"<script src="/main.js"></script>"#));
    }
}
