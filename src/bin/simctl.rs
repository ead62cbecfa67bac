use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use simhost::codec::{LlsdValue, XmlRpcRequest, XmlRpcResponse, XmlRpcValue};

#[derive(Parser)]
#[command(name = "simctl")]
#[command(about = "Probe CLI for a running simhost", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9000")]
    url: String,

    /// Admin API key
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List modules and the regions they are attached to
    Modules,
    /// Call an XML-RPC method; integers and true/false are sent typed
    Xmlrpc {
        method: String,
        params: Vec<String>,
    },
    /// Send an empty LLSD request to a path
    Llsd {
        path: String,
        /// Ask for an LLSD-JSON response instead of LLSD-XML
        #[arg(long)]
        json: bool,
    },
    /// Plain GET
    Get { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Modules => {
            let mut headers = HeaderMap::new();
            if let Some(key) = &cli.key {
                headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
            }
            let res = client
                .get(format!("{}/admin/modules", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_json_response(res).await?;
        }
        Commands::Xmlrpc { method, params } => {
            let request = XmlRpcRequest::new(method, params.iter().map(String::as_str).map(typed_param).collect());
            let res = client
                .post(format!("{}/", cli.url))
                .header(CONTENT_TYPE, "text/xml")
                .body(request.to_xml())
                .send()
                .await?;
            let status = res.status();
            let text = res.text().await?;
            match XmlRpcResponse::parse(&text) {
                Ok(XmlRpcResponse::Success(value)) => {
                    println!("{}", serde_json::to_string_pretty(&xmlrpc_to_json(&value))?)
                }
                Ok(XmlRpcResponse::Fault { code, message }) => eprintln!("Fault {}: {}", code, message),
                Err(_) => {
                    eprintln!("Error: server returned status {}", status);
                    eprintln!("Response: {}", text);
                }
            }
        }
        Commands::Llsd { path, json } => {
            let accept = if json { "application/llsd+json" } else { "application/llsd+xml" };
            let res = client
                .post(format!("{}{}", cli.url, path))
                .header(ACCEPT, accept)
                .header(CONTENT_TYPE, "application/llsd+xml")
                .send()
                .await?;
            let status = res.status();
            let bytes = res.bytes().await?;
            match LlsdValue::parse(&bytes) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&Value::from(&value))?),
                Err(_) => {
                    eprintln!("Error: server returned status {}", status);
                    eprintln!("Response: {}", String::from_utf8_lossy(&bytes));
                }
            }
        }
        Commands::Get { path } => {
            let res = client.get(format!("{}{}", cli.url, path)).send().await?;
            let status = res.status();
            let text = res.text().await?;
            if !status.is_success() {
                eprintln!("Status: {}", status);
            }
            println!("{}", text);
        }
    }

    Ok(())
}

fn typed_param(param: &str) -> XmlRpcValue {
    if let Ok(n) = param.parse::<i32>() {
        return XmlRpcValue::Int(n);
    }
    match param {
        "true" => XmlRpcValue::Boolean(true),
        "false" => XmlRpcValue::Boolean(false),
        _ => XmlRpcValue::String(param.to_string()),
    }
}

fn xmlrpc_to_json(value: &XmlRpcValue) -> Value {
    match value {
        XmlRpcValue::Int(n) => json!(n),
        XmlRpcValue::Boolean(b) => json!(b),
        XmlRpcValue::String(s) | XmlRpcValue::DateTime(s) => json!(s),
        XmlRpcValue::Double(d) => json!(d),
        XmlRpcValue::Base64(bytes) => json!(format!("<{} bytes>", bytes.len())),
        XmlRpcValue::Struct(members) => Value::Object(
            members
                .iter()
                .map(|(k, v)| (k.clone(), xmlrpc_to_json(v)))
                .collect(),
        ),
        XmlRpcValue::Array(items) => Value::Array(items.iter().map(xmlrpc_to_json).collect()),
        XmlRpcValue::Nil => Value::Null,
    }
}

async fn print_json_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
