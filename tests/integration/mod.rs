/// Integration tests across the repository, both storage backends, the
/// migration coordinator and the MCP tool surface

mod mcp_tests;
mod repository_tests;
mod support;
