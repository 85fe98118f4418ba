use tonic_build::manual::{Builder, Method, Service};

fn main() {
    let get_job = Method::builder()
        .name("get_job")
        .route_name("GetJob")
        .input_type("crate::proto::GetJobRequest")
        .output_type("crate::proto::GetJobResponse")
        .codec_path("tonic::codec::ProstCodec")
        .build();

    let service = Service::builder()
        .name("JobRouter")
        .package("runr.router")
        .method(get_job)
        .build();

    Builder::new().compile(&[service]);
}
