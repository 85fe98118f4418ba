use tonic_build::manual::{Builder, Method, Service};

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{input}"))
        .output_type(format!("crate::proto::{output}"))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    let service = Service::builder()
        .name("ProcessWrapper")
        .package("runr.wrapper")
        .method(method("check_status", "CheckStatus", "Empty", "StatusResponse"))
        .method(method(
            "init_graceful_shutdown",
            "InitGracefulShutdown",
            "InitGracefulShutdownRequest",
            "StatusResponse",
        ))
        .method(method(
            "init_forceful_shutdown",
            "InitForcefulShutdown",
            "Empty",
            "StatusResponse",
        ))
        .build();

    Builder::new().compile(&[service]);
}
