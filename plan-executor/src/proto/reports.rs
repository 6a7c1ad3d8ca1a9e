#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Trace {
    /// Wall clock time when the trace began.
    #[prost(message, optional, tag = "4")]
    pub start_time: ::core::option::Option<::prost_types::Timestamp>,
    /// Wall clock time when the trace ended.
    #[prost(message, optional, tag = "3")]
    pub end_time: ::core::option::Option<::prost_types::Timestamp>,
    /// High precision duration of the trace; may not equal
    /// end_time-start_time on machines with poor clocks.
    #[prost(uint64, tag = "11")]
    pub duration_ns: u64,
    /// A tree containing information about all resolvers run directly by
    /// this service, including errors.
    #[prost(message, optional, boxed, tag = "14")]
    pub root: ::core::option::Option<::prost::alloc::boxed::Box<trace::Node>>,
}
/// Nested message and enum types in `Trace`.
pub mod trace {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Error {
        #[prost(string, tag = "1")]
        pub message: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "2")]
        pub location: ::prost::alloc::vec::Vec<Location>,
        #[prost(uint64, tag = "3")]
        pub time_ns: u64,
        #[prost(string, tag = "4")]
        pub json: ::prost::alloc::string::String,
    }
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Location {
        #[prost(uint32, tag = "1")]
        pub line: u32,
        #[prost(uint32, tag = "2")]
        pub column: u32,
    }
    /// We store information on each resolver execution as a Node on a tree.
    /// The structure of the tree corresponds to the structure of the GraphQL
    /// response; it does not indicate the order in which resolvers were
    /// invoked.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Node {
        /// The name of the type (in the GraphQL schema) that this node's
        /// parent field returns.
        #[prost(string, tag = "13")]
        pub parent_type: ::prost::alloc::string::String,
        /// The GraphQL type of this field.
        #[prost(string, tag = "3")]
        pub r#type: ::prost::alloc::string::String,
        /// The field's name, if different from the response name due to an
        /// alias.
        #[prost(string, tag = "14")]
        pub original_field_name: ::prost::alloc::string::String,
        /// Relative to the trace's start_time, in ns.
        #[prost(uint64, tag = "8")]
        pub start_time: u64,
        /// Relative to the trace's start_time, in ns.
        #[prost(uint64, tag = "9")]
        pub end_time: u64,
        #[prost(message, repeated, tag = "11")]
        pub error: ::prost::alloc::vec::Vec<Error>,
        #[prost(message, repeated, tag = "12")]
        pub child: ::prost::alloc::vec::Vec<Node>,
        #[prost(oneof = "node::Id", tags = "1, 2")]
        pub id: ::core::option::Option<node::Id>,
    }
    /// Nested message and enum types in `Node`.
    pub mod node {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Id {
            /// The response name of the field.
            #[prost(string, tag = "1")]
            ResponseName(::prost::alloc::string::String),
            /// The index in a list.
            #[prost(uint32, tag = "2")]
            Index(u32),
        }
    }
    /// The query plan of the request, mirroring the plan tree that was
    /// executed.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct QueryPlanNode {
        #[prost(oneof = "query_plan_node::Node", tags = "1, 2, 3, 4")]
        pub node: ::core::option::Option<query_plan_node::Node>,
    }
    /// Nested message and enum types in `QueryPlanNode`.
    pub mod query_plan_node {
        /// This represents a set of nodes executed sequentially.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct SequenceNode {
            #[prost(message, repeated, tag = "1")]
            pub nodes: ::prost::alloc::vec::Vec<super::QueryPlanNode>,
        }
        /// This represents a set of nodes executed in parallel.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ParallelNode {
            #[prost(message, repeated, tag = "1")]
            pub nodes: ::prost::alloc::vec::Vec<super::QueryPlanNode>,
        }
        /// This represents a node to send an operation to a subgraph.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct FetchNode {
            /// The name of the service or subgraph the operation was sent
            /// to.
            #[prost(string, tag = "1")]
            pub service_name: ::prost::alloc::string::String,
            /// Whether the trace payload returned by the subgraph failed
            /// to decode.
            #[prost(bool, tag = "2")]
            pub trace_parsing_failed: bool,
            /// The trace returned by the subgraph, if any.
            #[prost(message, optional, tag = "3")]
            pub trace: ::core::option::Option<super::super::Trace>,
            /// Wall clock time offset from the start of the request to the
            /// time the fetch was sent, in ns.
            #[prost(uint64, tag = "4")]
            pub sent_time_offset: u64,
            #[prost(message, optional, tag = "5")]
            pub sent_time: ::core::option::Option<::prost_types::Timestamp>,
            #[prost(message, optional, tag = "6")]
            pub received_time: ::core::option::Option<::prost_types::Timestamp>,
        }
        /// This represents a node to change the location of the cursor
        /// before executing the child node.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct FlattenNode {
            #[prost(message, repeated, tag = "1")]
            pub response_path: ::prost::alloc::vec::Vec<ResponsePathElement>,
            #[prost(message, optional, boxed, tag = "2")]
            pub node: ::core::option::Option<::prost::alloc::boxed::Box<super::QueryPlanNode>>,
        }
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResponsePathElement {
            #[prost(oneof = "response_path_element::Id", tags = "1, 2")]
            pub id: ::core::option::Option<response_path_element::Id>,
        }
        /// Nested message and enum types in `ResponsePathElement`.
        pub mod response_path_element {
            #[derive(Clone, PartialEq, ::prost::Oneof)]
            pub enum Id {
                #[prost(string, tag = "1")]
                FieldName(::prost::alloc::string::String),
                #[prost(uint32, tag = "2")]
                Index(u32),
            }
        }
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Node {
            #[prost(message, tag = "1")]
            Sequence(SequenceNode),
            #[prost(message, tag = "2")]
            Parallel(ParallelNode),
            #[prost(message, tag = "3")]
            Fetch(FetchNode),
            #[prost(message, tag = "4")]
            Flatten(::prost::alloc::boxed::Box<FlattenNode>),
        }
    }
}
