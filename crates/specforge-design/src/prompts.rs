pub(crate) const ARCHITECT_SYSTEM_PROMPT: &str = "\
You are an expert software architect specializing in Python web services.

Analyze a product specification (in Markdown) and produce a detailed system design \
that a developer can use to build a complete, working FastAPI service.

The design must include:
1. Project metadata: name, description, Python version, dependencies
2. API endpoints: every endpoint with method, path, tags, auth requirement, request/response shapes
3. Database models: every table with fields, types, constraints and relationships
4. Environment variables: all required configuration (secrets, database paths, ...)
5. Deployment: base image, port, volumes
6. Middlewares: CORS, rate limiting, auth middleware, ...
7. Additional notes: implementation guidance and patterns to follow

Guidelines:
- Include ALL endpoints implied by the spec (CRUD, auth, health check, ...)
- Always include a health check endpoint (GET /health)
- Give every endpoint a tag naming its capability area (e.g. \"links\", \"auth\", \"admin\")
- auth is one of: none, jwt, api_key, jwt_or_api_key
- List ALL Python packages needed. Always include fastapi and uvicorn.
- Think about edge cases relevant to the spec (validation errors, duplicates, not found, ...)
";

/// The JSON shape the reply must follow.
pub(crate) const DESIGN_SHAPE: &str = r#"{
  "project_name": "string",
  "description": "string",
  "python_version": "3.12",
  "dependencies": ["fastapi", "uvicorn", "..."],
  "endpoints": [
    {
      "method": "GET|POST|PUT|PATCH|DELETE",
      "path": "/resource/{id}",
      "summary": "string",
      "description": "string",
      "auth": "none|jwt|api_key|jwt_or_api_key",
      "rate_limited": false,
      "tags": ["resource"],
      "request_body": {"fields": [{"name": "string", "type": "string", "is_required": true}]},
      "response": {"fields": [{"name": "string", "type": "string"}], "is_list": false}
    }
  ],
  "database_models": [
    {
      "name": "Resource",
      "table_name": "resources",
      "description": "string",
      "fields": [
        {"name": "id", "type": "integer", "primary_key": true, "nullable": false,
         "unique": false, "indexed": false, "default_value": null}
      ],
      "relationships": ["Resource has many Children"]
    }
  ],
  "env_variables": [
    {"name": "JWT_SECRET", "description": "string", "default_value": "", "is_mandatory": true}
  ],
  "deployment": {"base_image": "python:3.12-slim", "port": 8000, "volumes": ["./data:/app/data"]},
  "middlewares": [{"name": "CORSMiddleware", "description": "string"}],
  "additional_notes": "string"
}"#;

pub(crate) fn architect_user_prompt(spec_text: &str) -> String {
    format!(
        "Analyze the following product specification and produce a complete system design.\n\n\
         ## Product Specification\n\n{spec_text}\n\n---\n\n\
         Include every endpoint, every database model, every environment variable and every \
         middleware needed to fully implement this spec.\n\n\
         Return your response as a single JSON object with this shape:\n{DESIGN_SHAPE}\n\n\
         Return ONLY valid JSON, no code fences, no explanation."
    )
}
