//! ```text
//! cargo run --example client -- get coap://127.0.0.1/hello
//! cargo run --example client -- observe coap://127.0.0.1/temp
//! cargo run --example client -- discover coap://127.0.0.1 rt=temperature
//! cargo run --example client -- ping coap://127.0.0.1
//! ```

use std::sync::Arc;

use ribbit::exchange::Exchange;
use ribbit::link_format;
use ribbit::req::{Method, Req};
use ribbit::time::Timeout;

const USAGE: &str = "usage: client <get|observe|discover|ping> <coap://host[:port]/path> [query]";

fn report(exchange: &Exchange) {
  match exchange.wait(Timeout::Millis(100_000)) {
    | Some(resp) => log::info!("{} {} ({}ms): {}",
                               resp.source(),
                               resp.code(),
                               resp.rtt().0,
                               resp.payload_str().unwrap_or("<binary>")),
    | None => log::error!("no response ({:?})", exchange.failure()),
  }
}

fn main() {
  simple_logger::init_with_level(log::Level::Info).unwrap();

  let args = std::env::args().skip(1).collect::<Vec<_>>();
  let (cmd, uri) = match args.as_slice() {
    | [cmd, uri, ..] => (cmd.as_str(), uri.as_str()),
    | _ => {
      eprintln!("{}", USAGE);
      std::process::exit(1);
    },
  };

  let req = Req::from_uri(Method::GET, uri).unwrap();
  let dest = req.dest();

  let endpoint = Arc::new(ribbit::std::Endpoint::bind("0.0.0.0:0", Default::default()).unwrap());
  let driver = ribbit::std::Driver::spawn(endpoint.clone()).unwrap();

  match cmd {
    | "get" => report(&endpoint.send(req).unwrap()),
    | "ping" => report(&endpoint.ping(dest).unwrap()),
    | "discover" => {
      let exchange = endpoint.discover(dest, args.get(2).map(String::as_str))
                             .unwrap();
      match exchange.wait(Timeout::Millis(100_000)) {
        | Some(resp) => match link_format::parse_payload(resp.payload()) {
          | Ok(links) => links.iter().for_each(|link| log::info!("{}", link)),
          | Err(e) => log::error!("{} sent a malformed link-format document: {:?}", dest, e),
        },
        | None => log::error!("no response ({:?})", exchange.failure()),
      }
    },
    | "observe" => {
      let exchange = endpoint.observe(req).unwrap();
      for _ in 0..10 {
        match exchange.next_notification(Timeout::Millis(60_000)) {
          | Some(resp) => log::info!("#{:?}: {}",
                                     resp.notification_seq(),
                                     resp.payload_str().unwrap_or("<binary>")),
          | None => break,
        }
      }
      if let Ok(dereg) = endpoint.cancel_proactively(&exchange) {
        report(&dereg);
      }
    },
    | _ => eprintln!("{}", USAGE),
  }

  driver.stop();
}
