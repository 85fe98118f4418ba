//! Job router wire types and generated service stubs.
//!
//! Both messages carry a JSON document as opaque bytes.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetJobRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub job_request: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetJobResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub job_response: Vec<u8>,
}

include!(concat!(env!("OUT_DIR"), "/runr.router.JobRouter.rs"));
