//! The CoRE link format ([RFC 6690](https://www.rfc-editor.org/rfc/rfc6690)),
//! which servers use to describe their resources at `/.well-known/core`.
//!
//! ```
//! use ribbit::link_format::{self, Link};
//!
//! let links =
//!   link_format::parse(r#"</sensors/temp>;rt="temperature-c";if="sensor";obs,</sensors/light>;ct="0 50""#).unwrap();
//!
//! assert_eq!(links[0].target, "/sensors/temp");
//! assert_eq!(links[0].rt, vec!["temperature-c"]);
//! assert!(links[0].obs);
//! assert_eq!(links[1].ct, vec![0, 50]);
//!
//! let temps = link_format::filter(&links, "rt=temp*").collect::<Vec<&Link>>();
//! assert_eq!(temps, vec![&links[0]]);
//! ```

use core::fmt;
use core::str::FromStr;

/// Path of the resource discovery resource
pub const WELL_KNOWN_CORE: &str = "/.well-known/core";

/// Errors encounterable parsing a link-format document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkParseError {
  /// The document was not UTF-8
  NotUtf8,
  /// A link did not start with `<target>`
  MissingTarget(String),
  /// A `<` was never closed
  UnterminatedTarget,
  /// A quoted value was never closed
  UnterminatedQuote,
  /// A parameter had no name (e.g. `;=1`)
  EmptyParam,
  /// A numeric parameter (`ct`, `sz`) had a value that is not a number
  #[allow(missing_docs)]
  InvalidNumber { param: String, value: String },
}

/// One link: a target resource and its attributes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
  /// The URI (usually just a path) of the resource
  pub target: String,
  /// Resource types
  pub rt: Vec<String>,
  /// Interface descriptions
  pub interface: Vec<String>,
  /// Content-Formats the resource can be requested in
  pub ct: Vec<u16>,
  /// Estimated size of the representation, in bytes
  pub sz: Option<u64>,
  /// Human readable description
  pub title: Option<String>,
  /// The resource is observable
  pub obs: bool,
  /// Every other attribute, in order
  pub other: Vec<(String, Option<String>)>,
}

impl Link {
  /// A link to `target` without attributes
  pub fn new(target: impl Into<String>) -> Self {
    Self { target: target.into(),
           ..Default::default() }
  }

  /// Does the link match a discovery query such as `rt=temp*` or `href=/sensors/*`?
  ///
  /// A trailing `*` matches any suffix. A query without a value (e.g. `obs`)
  /// matches links that have the attribute at all.
  ///
  /// ```
  /// use ribbit::link_format::Link;
  ///
  /// let link: Link = r#"</a/b>;rt="x y";sz=12;foo=bar"#.parse().unwrap();
  ///
  /// assert!(link.matches("rt=y"));
  /// assert!(link.matches("href=/a*"));
  /// assert!(link.matches("sz=12"));
  /// assert!(link.matches("foo=b*"));
  /// assert!(link.matches("foo"));
  /// assert!(!link.matches("rt=z"));
  /// assert!(!link.matches("obs"));
  /// ```
  pub fn matches(&self, query: &str) -> bool {
    let (name, pattern) = match query.split_once('=') {
      | Some((name, pattern)) => (name, Some(pattern)),
      | None => (query, None),
    };

    let values: Vec<String> = match name {
      | "href" => vec![self.target.clone()],
      | "rt" => self.rt.clone(),
      | "if" => self.interface.clone(),
      | "ct" => self.ct.iter().map(u16::to_string).collect(),
      | "sz" => self.sz.iter().map(u64::to_string).collect(),
      | "title" => self.title.iter().cloned().collect(),
      | "obs" if self.obs => vec![String::new()],
      | "obs" => vec![],
      | other => self.other
                     .iter()
                     .filter(|(k, _)| k == other)
                     .map(|(_, v)| v.clone().unwrap_or_default())
                     .collect(),
    };

    match pattern {
      | None => !values.is_empty(),
      | Some(pattern) => values.iter().any(|v| glob_matches(pattern, v)),
    }
  }
}

fn glob_matches(pattern: &str, value: &str) -> bool {
  match pattern.strip_suffix('*') {
    | Some(prefix) => value.starts_with(prefix),
    | None => pattern == value,
  }
}

/// Split on `sep`, except within quotes or angle brackets
fn split_outside(s: &str, sep: char) -> Result<Vec<&str>, LinkParseError> {
  let mut parts = Vec::new();
  let mut start = 0;
  let mut quoted = false;
  let mut bracketed = false;
  let mut escaped = false;

  for (ix, c) in s.char_indices() {
    match c {
      | _ if escaped => escaped = false,
      | '\\' if quoted => escaped = true,
      | '"' if !bracketed => quoted = !quoted,
      | '<' if !quoted => bracketed = true,
      | '>' if !quoted => bracketed = false,
      | c if c == sep && !quoted && !bracketed => {
        parts.push(&s[start..ix]);
        start = ix + c.len_utf8();
      },
      | _ => (),
    }
  }

  if quoted {
    return Err(LinkParseError::UnterminatedQuote);
  }
  if bracketed {
    return Err(LinkParseError::UnterminatedTarget);
  }

  parts.push(&s[start..]);
  Ok(parts)
}

fn unquote(value: &str) -> String {
  match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
    | Some(inner) => {
      let mut out = String::with_capacity(inner.len());
      let mut chars = inner.chars();
      while let Some(c) = chars.next() {
        match c {
          | '\\' => out.extend(chars.next()),
          | c => out.push(c),
        }
      }
      out
    },
    | None => value.to_string(),
  }
}

fn quote(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn number<T: FromStr>(param: &str, value: &str) -> Result<T, LinkParseError> {
  value.parse().map_err(|_| LinkParseError::InvalidNumber { param: param.to_string(),
                                                            value: value.to_string() })
}

impl FromStr for Link {
  type Err = LinkParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let rest = s.strip_prefix('<')
                .ok_or_else(|| LinkParseError::MissingTarget(s.to_string()))?;
    let close = rest.find('>').ok_or(LinkParseError::UnterminatedTarget)?;

    let mut link = Link::new(&rest[..close]);

    let params = &rest[close + 1..];
    for param in split_outside(params, ';')?.into_iter().skip(1) {
      let (name, value) = match param.split_once('=') {
        | Some((name, value)) => (name.trim(), Some(unquote(value.trim()))),
        | None => (param.trim(), None),
      };

      if name.is_empty() {
        return Err(LinkParseError::EmptyParam);
      }

      let words = || {
        value.iter()
             .flat_map(|v| v.split_whitespace())
             .map(String::from)
             .collect::<Vec<_>>()
      };

      match name {
        | "rt" => link.rt.extend(words()),
        | "if" => link.interface.extend(words()),
        | "ct" => {
          for ct in words() {
            link.ct.push(number(name, &ct)?);
          }
        },
        | "sz" => link.sz = Some(number(name, value.as_deref().unwrap_or_default())?),
        | "title" => link.title = value,
        | "obs" => link.obs = true,
        | other => link.other.push((other.to_string(), value)),
      }
    }

    Ok(link)
  }
}

impl fmt::Display for Link {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<{}>", self.target)?;

    if !self.rt.is_empty() {
      write!(f, ";rt={}", quote(&self.rt.join(" ")))?;
    }
    if !self.interface.is_empty() {
      write!(f, ";if={}", quote(&self.interface.join(" ")))?;
    }
    match self.ct.as_slice() {
      | [] => (),
      | [ct] => write!(f, ";ct={}", ct)?,
      | cts => {
        let cts = cts.iter().map(u16::to_string).collect::<Vec<_>>();
        write!(f, ";ct={}", quote(&cts.join(" ")))?
      },
    }
    if let Some(sz) = self.sz {
      write!(f, ";sz={}", sz)?;
    }
    if let Some(title) = &self.title {
      write!(f, ";title={}", quote(title))?;
    }
    if self.obs {
      write!(f, ";obs")?;
    }

    for (name, value) in &self.other {
      match value {
        | None => write!(f, ";{}", name)?,
        | Some(v) if v.chars().any(|c| matches!(c, ';' | ',' | '"' | ' ' | '\\')) => {
          write!(f, ";{}={}", name, quote(v))?
        },
        | Some(v) => write!(f, ";{}={}", name, v)?,
      }
    }

    Ok(())
  }
}

/// Parse a link-format document
pub fn parse(doc: &str) -> Result<Vec<Link>, LinkParseError> {
  split_outside(doc, ',')?.into_iter()
                          .filter(|link| !link.trim().is_empty())
                          .map(str::parse)
                          .collect()
}

/// Parse a link-format payload, e.g. of a response to a
/// [discovery request](crate::core::Endpoint::discover)
pub fn parse_payload(payload: &[u8]) -> Result<Vec<Link>, LinkParseError> {
  core::str::from_utf8(payload).map_err(|_| LinkParseError::NotUtf8)
                               .and_then(parse)
}

/// Write links as a link-format document
pub fn format(links: &[Link]) -> String {
  links.iter()
       .map(Link::to_string)
       .collect::<Vec<_>>()
       .join(",")
}

/// The links matching a discovery query; see [`Link::matches`]
pub fn filter<'a>(links: &'a [Link], query: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
  links.iter().filter(move |link| link.matches(query))
}

#[cfg(test)]
mod tests {
  use super::*;

  const DOC: &str = concat!(r#"</sensors/temp>;rt="temperature-c";if="sensor";ct=0;obs,"#,
                            r#"</sensors/light>;rt="light-lux light";if="sensor";ct="0 50";sz=128;"#,
                            r#"title="Light, \"lux\"","#,
                            "\n</.well-known/core>");

  #[test]
  fn parse_document() {
    let links = parse(DOC).unwrap();
    assert_eq!(links.len(), 3);

    assert_eq!(links[0],
               Link { target: "/sensors/temp".into(),
                      rt: vec!["temperature-c".into()],
                      interface: vec!["sensor".into()],
                      ct: vec![0],
                      obs: true,
                      ..Default::default() });

    assert_eq!(links[1].rt, vec!["light-lux", "light"]);
    assert_eq!(links[1].ct, vec![0, 50]);
    assert_eq!(links[1].sz, Some(128));
    assert_eq!(links[1].title.as_deref(), Some(r#"Light, "lux""#));

    assert_eq!(links[2], Link::new(WELL_KNOWN_CORE));
  }

  #[test]
  fn print_then_parse() {
    let links = parse(DOC).unwrap();
    assert_eq!(parse(&format(&links)).unwrap(), links);

    assert_eq!(links[0].to_string(),
               r#"</sensors/temp>;rt="temperature-c";if="sensor";ct=0;obs"#);
  }

  #[test]
  fn filtering() {
    let links = parse(DOC).unwrap();
    let targets = |q: &'static str| {
      filter(&links, q).map(|l| l.target.as_str())
                       .collect::<Vec<_>>()
    };

    assert_eq!(targets("rt=light"), vec!["/sensors/light"]);
    assert_eq!(targets("if=sensor"), vec!["/sensors/temp", "/sensors/light"]);
    assert_eq!(targets("href=/sensors*"), vec!["/sensors/temp", "/sensors/light"]);
    assert_eq!(targets("ct=50"), vec!["/sensors/light"]);
    assert_eq!(targets("obs"), vec!["/sensors/temp"]);
    assert!(targets("rt=nope*").is_empty());
  }

  #[test]
  fn errors() {
    assert_eq!(parse("/no/brackets"),
               Err(LinkParseError::MissingTarget("/no/brackets".into())));
    assert_eq!(parse("</a"), Err(LinkParseError::UnterminatedTarget));
    assert_eq!(parse(r#"</a>;title="oops"#), Err(LinkParseError::UnterminatedQuote));
    assert_eq!(parse("</a>;=1"), Err(LinkParseError::EmptyParam));
    assert_eq!(parse("</a>;sz=big"),
               Err(LinkParseError::InvalidNumber { param: "sz".into(),
                                                   value: "big".into() }));
    assert_eq!(parse_payload(&[0xff, 0xfe]), Err(LinkParseError::NotUtf8));
  }

  #[test]
  fn unknown_attributes_kept() {
    let link: Link = "</a>;anchor=\"/b\";foo".parse().unwrap();
    assert_eq!(link.other,
               vec![("anchor".to_string(), Some("/b".to_string())),
                    ("foo".to_string(), None)]);
    assert_eq!(link.to_string(), "</a>;anchor=/b;foo");
  }

  #[cfg(feature = "serde")]
  #[test]
  fn links_as_json() {
    let links = parse(DOC).unwrap();
    let json = serde_json::to_string(&links).unwrap();

    assert!(json.contains(r#""target":"/sensors/temp""#));
    assert_eq!(serde_json::from_str::<Vec<Link>>(&json).unwrap(), links);
  }
}
