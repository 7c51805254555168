//! Minimal echo client: calls `echo(s: String) -> String` synchronously
//! against the `echo_server` demo and prints the result.

use argh::FromArgs;
use msgpack_rpc::client::ClientBuilder;

#[derive(FromArgs)]
/// msgpack-rpc echo client demo
struct Args {
    /// server address
    #[argh(option, default = "\"127.0.0.1:18800\".to_string()")]
    addr: String,

    /// message to echo
    #[argh(option, default = "\"hello, msgpack-rpc\".to_string()")]
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Args = argh::from_env();
    let client = ClientBuilder::tcp(args.addr).await?;

    let echoed: String = client.call("echo", vec![rmpv::Value::from(args.message.clone())]).await?;
    println!("echo({:?}) = {:?}", args.message, echoed);
    Ok(())
}
