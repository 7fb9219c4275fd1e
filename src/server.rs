use std::{
    fs,
    io::{self, BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use tracing::{debug, info, warn};

use crate::constants::{api::RESULTS_ROUTE, files::SNAPSHOT_FILE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn text(code: u16, body: impl Into<String>) -> Self {
        Self {
            code,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    fn json(body: String) -> Self {
        Self {
            code: 200,
            content_type: "application/json",
            body,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self.code {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }
}

/// Serves `<root>/<ticker>/today.json` until the listener fails.
pub fn serve(bind: &str, root: PathBuf) -> io::Result<()> {
    let listener = TcpListener::bind(bind)?;
    let root = Arc::new(root);

    info!(bind, root = %root.display(), "results server listening");

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let root = Arc::clone(&root);
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &root) {
                        warn!(%err, "connection error");
                    }
                });
            }
            Err(err) => warn!(%err, "accept error"),
        }
    }

    Ok(())
}

fn handle_connection(mut stream: TcpStream, root: &Path) -> io::Result<()> {
    let request_line = {
        let mut reader = BufReader::new(&mut stream);
        let mut request_line = String::new();
        if reader.read_line(&mut request_line)? == 0 {
            return Ok(());
        }

        loop {
            let mut header_line = String::new();
            if reader.read_line(&mut header_line)? == 0 {
                break;
            }
            if header_line == "\r\n" || header_line == "\n" {
                break;
            }
        }
        request_line
    };

    let response = match parse_request_line(&request_line) {
        Some((method, target)) => route(&method, &target, root),
        None => Response::text(400, "could not parse request line\n"),
    };
    debug!(request = request_line.trim_end(), code = response.code, "handled request");

    write_response(&mut stream, &response)
}

/// Dispatches one request without touching the socket.
pub fn route(method: &str, target: &str, root: &Path) -> Response {
    if method != "GET" {
        return Response::text(405, "only GET is supported\n");
    }

    let path = target.split_once('?').map_or(target, |(path, _)| path);
    match path {
        "/health" => Response::text(200, "ok\n"),
        RESULTS_ROUTE => results(target, root),
        _ => Response::text(404, format!("routes: /health, {RESULTS_ROUTE}?ticker=T\n")),
    }
}

fn results(target: &str, root: &Path) -> Response {
    let Some(ticker) = parse_query(target, "ticker") else {
        return Response::text(400, "missing ticker\n");
    };
    if !valid_ticker(ticker) {
        return Response::text(400, "invalid ticker\n");
    }

    let path = root.join(ticker).join(SNAPSHOT_FILE);
    match fs::read_to_string(&path) {
        Ok(body) => Response::json(body),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Response::text(404, format!("no results for {ticker}\n"))
        }
        Err(err) => {
            warn!(%err, path = %path.display(), "failed to read results");
            Response::text(500, format!("failed to read results: {err}\n"))
        }
    }
}

/// Tickers become path components, so only plain symbol characters pass.
fn valid_ticker(ticker: &str) -> bool {
    !ticker.is_empty()
        && ticker.len() <= 16
        && !ticker.starts_with('.')
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn parse_request_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let _version = parts.next()?;
    Some((method, target))
}

fn parse_query<'a>(target: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = target.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn write_response(stream: &mut TcpStream, response: &Response) -> io::Result<()> {
    let headers = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.code,
        response.reason(),
        response.content_type,
        response.body.len()
    );
    stream.write_all(headers.as_bytes())?;
    stream.write_all(response.body.as_bytes())?;
    stream.flush()
}
