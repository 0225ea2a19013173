//! Wire types for the packhouse scheduler RPC surface, generated at build
//! time from the `.proto` definitions under `src/proto/defs`.

pub mod scheduler {
    tonic::include_proto!("packhouse.scheduler");
}

pub mod principals {
    tonic::include_proto!("packhouse.principals");
}
